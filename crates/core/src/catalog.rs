//! Catalog entities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bag::BagError;
use crate::types::{CategoryId, ProductId};

/// A product category, e.g. `jeans` shown as "Jeans".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Category {
    pub id: CategoryId,
    /// Machine name used in `?category=` filters.
    pub name: String,
    pub friendly_name: Option<String>,
}

impl Category {
    /// Human-readable name, falling back to the machine name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }
}

/// A purchasable product.
///
/// `price` is the unit price in the store currency. Products with
/// `has_sizes` set are added to the bag per size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Product {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub sku: Option<String>,
    pub name: String,
    pub description: String,
    pub has_sizes: bool,
    pub price: Decimal,
    pub rating: Option<Decimal>,
    pub image_url: Option<String>,
}

/// Size labels offered for sized products, smallest first.
pub const PRODUCT_SIZES: [&str; 5] = ["xs", "s", "m", "l", "xl"];

impl Product {
    /// Check a size selection against this product.
    ///
    /// Labels are matched case-insensitively and returned in their stored
    /// lower-case form.
    ///
    /// # Errors
    ///
    /// - `SizeRequired` if the product has sizes and none was given
    /// - `SizeNotOffered` if the product has no sizes and one was given
    /// - `UnknownSize` if the label is not in [`PRODUCT_SIZES`]
    pub fn select_size(&self, size: Option<&str>) -> Result<Option<&'static str>, BagError> {
        match (self.has_sizes, size) {
            (false, None) => Ok(None),
            (false, Some(_)) => Err(BagError::SizeNotOffered(self.id)),
            (true, None) => Err(BagError::SizeRequired(self.id)),
            (true, Some(label)) => PRODUCT_SIZES
                .iter()
                .find(|known| known.eq_ignore_ascii_case(label.trim()))
                .copied()
                .map(Some)
                .ok_or_else(|| BagError::UnknownSize(label.trim().to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(has_sizes: bool) -> Product {
        Product {
            id: ProductId::new(4),
            category_id: None,
            sku: None,
            name: "Slim Jeans".to_string(),
            description: String::new(),
            has_sizes,
            price: Decimal::new(3000, 2),
            rating: None,
            image_url: None,
        }
    }

    #[test]
    fn test_select_size_accepts_offered_labels() {
        assert_eq!(product(true).select_size(Some("M")).unwrap(), Some("m"));
        assert_eq!(product(true).select_size(Some(" xl ")).unwrap(), Some("xl"));
        assert_eq!(product(false).select_size(None).unwrap(), None);
    }

    #[test]
    fn test_size_on_unsized_product_is_rejected() {
        assert_eq!(
            product(false).select_size(Some("m")),
            Err(BagError::SizeNotOffered(ProductId::new(4)))
        );
    }

    #[test]
    fn test_sized_product_requires_a_size() {
        assert_eq!(
            product(true).select_size(None),
            Err(BagError::SizeRequired(ProductId::new(4)))
        );
    }

    #[test]
    fn test_unknown_size_is_rejected() {
        assert_eq!(
            product(true).select_size(Some("extraextralarge")),
            Err(BagError::UnknownSize("extraextralarge".to_string()))
        );
        for label in PRODUCT_SIZES {
            assert!(label.len() <= 10);
        }
    }
}
