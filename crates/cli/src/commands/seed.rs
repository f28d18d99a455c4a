//! Seed the product catalog from a YAML file.
//!
//! ```yaml
//! categories:
//!   - name: jeans
//!     friendly_name: Jeans
//! products:
//!   - sku: pp5001340155
//!     category: jeans
//!     name: Slim Fit Jeans
//!     description: Dark wash, five pockets.
//!     has_sizes: true
//!     price: "39.99"
//!     rating: "4.5"
//!     image_url: https://cdn.example.com/jeans.jpg
//! ```
//!
//! Categories and products are upserted by name and SKU, so running the
//! same file twice leaves the catalog unchanged.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use kestrel_core::CategoryId;
use kestrel_storefront::db::ProductRepository;
use kestrel_storefront::db::products::ProductUpsert;

use super::connect;

/// Top-level layout of a catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
    #[serde(default)]
    pub products: Vec<ProductEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductEntry {
    pub sku: String,
    #[serde(default)]
    pub category: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub has_sizes: bool,
    pub price: Decimal,
    #[serde(default)]
    pub rating: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl From<&ProductEntry> for ProductUpsert {
    fn from(entry: &ProductEntry) -> Self {
        Self {
            sku: entry.sku.clone(),
            category: entry.category.clone(),
            name: entry.name.clone(),
            description: entry.description.clone(),
            has_sizes: entry.has_sizes,
            price: entry.price,
            rating: entry.rating,
            image_url: entry.image_url.clone(),
        }
    }
}

/// Collect every problem in a catalog file before touching the database.
#[must_use]
pub fn validate(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut skus = HashMap::new();

    for (index, product) in catalog.products.iter().enumerate() {
        if product.sku.trim().is_empty() {
            errors.push(format!("product #{index}: sku is empty"));
        }
        if product.name.trim().is_empty() {
            errors.push(format!("product {}: name is empty", product.sku));
        }
        if product.price.is_sign_negative() {
            errors.push(format!("product {}: price is negative", product.sku));
        }
        if let Some(rating) = product.rating
            && !(Decimal::ZERO..=Decimal::from(5)).contains(&rating)
        {
            errors.push(format!("product {}: rating {rating} is outside 0-5", product.sku));
        }
        if let Some(previous) = skus.insert(product.sku.as_str(), index) {
            errors.push(format!(
                "product {}: duplicate sku (also product #{previous})",
                product.sku
            ));
        }
    }

    errors
}

/// Seed categories and products from `file_path`.
///
/// Categories referenced by a product but not declared in `categories` are
/// created with no friendly name.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, or if a
/// database operation fails.
pub async fn products(file_path: &str, clear_existing: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;
    info!(
        categories = catalog.categories.len(),
        products = catalog.products.len(),
        "Parsed catalog"
    );

    let errors = validate(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);

    if clear_existing {
        let deleted = repo.delete_all().await?;
        info!(deleted, "Cleared existing products");
    }

    let mut category_ids: HashMap<String, CategoryId> = HashMap::new();
    for category in &catalog.categories {
        let id = repo
            .upsert_category(&category.name, category.friendly_name.as_deref())
            .await?;
        category_ids.insert(category.name.clone(), id);
    }

    for entry in &catalog.products {
        let category_id = match &entry.category {
            Some(name) => {
                if let Some(id) = category_ids.get(name) {
                    Some(*id)
                } else {
                    let id = repo.upsert_category(name, None).await?;
                    category_ids.insert(name.clone(), id);
                    Some(id)
                }
            }
            None => None,
        };
        repo.upsert(&ProductUpsert::from(entry), category_id).await?;
    }

    info!("Seeding complete!");
    info!("  Categories: {}", category_ids.len());
    info!("  Products upserted: {}", catalog.products.len());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
categories:
  - name: jeans
    friendly_name: Jeans
products:
  - sku: pp5001340155
    category: jeans
    name: Slim Fit Jeans
    has_sizes: true
    price: "39.99"
    rating: "4.5"
  - sku: pp5002004151
    name: Canvas Tote
    price: "12.00"
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        assert_eq!(catalog.categories.len(), 1);
        assert_eq!(catalog.products.len(), 2);

        let tote = ProductUpsert::from(&catalog.products[1]);
        assert!(!tote.has_sizes);
        assert!(tote.category.is_none());
        assert!(tote.rating.is_none());
        assert_eq!(tote.description, "");
        assert!(validate(&catalog).is_empty());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let catalog: CatalogFile = serde_yaml::from_str(
            r#"
products:
  - sku: a1
    name: ""
    price: "-1"
  - sku: a1
    name: Twin
    price: "5"
    rating: "7"
"#,
        )
        .unwrap();

        let errors = validate(&catalog);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("duplicate sku")));
        assert!(errors.iter().any(|e| e.contains("outside 0-5")));
    }
}
