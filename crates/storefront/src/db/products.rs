//! Product and category repository.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use kestrel_core::{Category, CategoryId, Product, ProductId};

use super::RepositoryError;

const PRODUCT_COLUMNS: &str = "p.id, p.category_id, p.sku, p.name, p.description, p.has_sizes, \
                               p.price, p.rating, p.image_url";

/// Column to sort product listings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Price,
    Rating,
    Name,
    Category,
}

impl SortKey {
    /// Parse the `sort` query parameter.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "price" => Some(Self::Price),
            "rating" => Some(Self::Rating),
            "name" => Some(Self::Name),
            "category" => Some(Self::Category),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Rating => "rating",
            Self::Name => "name",
            Self::Category => "category",
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Price => "p.price",
            Self::Rating => "p.rating",
            Self::Name => "LOWER(p.name)",
            Self::Category => "c.name",
        }
    }
}

/// Sort direction for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse the `direction` query parameter; anything but `desc` is ascending.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC NULLS LAST",
            Self::Desc => "DESC NULLS LAST",
        }
    }
}

/// Filters for the product listing page.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Case-insensitive substring matched against name or description.
    pub search: Option<String>,
    /// Category machine names; empty means all categories.
    pub categories: Vec<String>,
    pub sort: Option<(SortKey, SortDirection)>,
}

/// Catalog entry as loaded by the seeding CLI.
#[derive(Debug, Clone)]
pub struct ProductUpsert {
    pub sku: String,
    pub category: Option<String>,
    pub name: String,
    pub description: String,
    pub has_sizes: bool,
    pub price: Decimal,
    pub rating: Option<Decimal>,
    pub image_url: Option<String>,
}

/// Escape `%`, `_` and `\` so user input matches literally in `ILIKE`.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Repository for catalog reads and seeding writes.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Get several products keyed by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();

        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.products p WHERE p.id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(self.pool)
        .await?;

        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    /// List products matching a query.
    ///
    /// Without an explicit sort, products are listed by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: &ProductQuery) -> Result<Vec<Product>, RepositoryError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.products p \
             LEFT JOIN storefront.categories c ON c.id = p.category_id WHERE TRUE"
        ));

        if let Some(term) = &query.search {
            let pattern = like_pattern(term);
            qb.push(" AND (p.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if !query.categories.is_empty() {
            qb.push(" AND c.name = ANY(")
                .push_bind(query.categories.clone())
                .push(")");
        }

        match query.sort {
            Some((key, direction)) => {
                qb.push(" ORDER BY ")
                    .push(key.column())
                    .push(" ")
                    .push(direction.sql())
                    .push(", p.id");
            }
            None => {
                qb.push(" ORDER BY p.id");
            }
        }

        let products = qb.build_query_as::<Product>().fetch_all(self.pool).await?;
        Ok(products)
    }

    /// Categories with the given machine names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories_by_name(
        &self,
        names: &[String],
    ) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, friendly_name FROM storefront.categories \
             WHERE name = ANY($1) ORDER BY name",
        )
        .bind(names)
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    /// Insert or rename a category by machine name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_category(
        &self,
        name: &str,
        friendly_name: Option<&str>,
    ) -> Result<CategoryId, RepositoryError> {
        let id = sqlx::query_scalar::<_, CategoryId>(
            r"
            INSERT INTO storefront.categories (name, friendly_name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
                SET friendly_name = COALESCE(EXCLUDED.friendly_name, storefront.categories.friendly_name)
            RETURNING id
            ",
        )
        .bind(name)
        .bind(friendly_name)
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }

    /// Insert a product, or update the product with the same SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(
        &self,
        product: &ProductUpsert,
        category_id: Option<CategoryId>,
    ) -> Result<ProductId, RepositoryError> {
        let id = sqlx::query_scalar::<_, ProductId>(
            r"
            INSERT INTO storefront.products
                (sku, category_id, name, description, has_sizes, price, rating, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (sku) DO UPDATE SET
                category_id = EXCLUDED.category_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                has_sizes = EXCLUDED.has_sizes,
                price = EXCLUDED.price,
                rating = EXCLUDED.rating,
                image_url = EXCLUDED.image_url
            RETURNING id
            ",
        )
        .bind(&product.sku)
        .bind(category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.has_sizes)
        .bind(product.price)
        .bind(product.rating)
        .bind(&product.image_url)
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }

    /// Delete every product. Line items referencing them cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.products")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
