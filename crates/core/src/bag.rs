//! The shopping bag value object.
//!
//! A [`Bag`] maps product IDs to either a plain quantity or a per-size
//! quantity table. It is owned by the session, loaded whole, mutated through
//! [`Bag::add`], [`Bag::adjust`] and [`Bag::remove`], and written back whole.
//!
//! Invariant: every stored quantity is positive, and a sized entry always has
//! at least one size. Deserialization enforces the same rule, so a bag read
//! back from a session or an order snapshot can never violate it.
//!
//! The JSON form is the one embedded in payment-intent metadata and in
//! `orders.original_bag`:
//!
//! ```json
//! {"5": {"items_by_size": {"l": 2, "m": 1}}, "12": 2}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ProductId;

/// Errors produced by bag mutations and snapshot parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BagError {
    /// Quantities added to the bag must be at least one.
    #[error("quantity must be a positive whole number")]
    InvalidQuantity,

    /// The product is not in the bag.
    #[error("product {0} is not in your bag")]
    NotInBag(ProductId),

    /// The product is in the bag, but not in this size.
    #[error("size {size} of product {product_id} is not in your bag")]
    SizeNotInBag { product_id: ProductId, size: String },

    /// A size was given for an unsized entry, or omitted for a sized one.
    #[error("product {0} is in your bag with a different size selection")]
    SizeMismatch(ProductId),

    /// The product is sold in sizes and none was chosen.
    #[error("please choose a size for product {0}")]
    SizeRequired(ProductId),

    /// The product is not sold in sizes.
    #[error("product {0} does not come in sizes")]
    SizeNotOffered(ProductId),

    /// The size label is not one the shop sells.
    #[error("{0:?} is not an available size")]
    UnknownSize(String),

    /// Accumulated quantity overflowed.
    #[error("quantity for product {0} is too large")]
    QuantityOverflow(ProductId),

    /// A stored snapshot could not be parsed.
    #[error("invalid bag snapshot: {0}")]
    InvalidSnapshot(String),
}

/// One product's worth of bag contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BagEntry {
    /// Product without size variants.
    Simple(u32),
    /// Product sold in sizes; quantities keyed by size label.
    Sized {
        items_by_size: BTreeMap<String, u32>,
    },
}

impl BagEntry {
    /// Total units across all sizes.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        match self {
            Self::Simple(quantity) => u64::from(*quantity),
            Self::Sized { items_by_size } => items_by_size.values().copied().map(u64::from).sum(),
        }
    }

    /// Flatten into `(size, quantity)` pairs, one per future line item.
    #[must_use]
    pub fn lines(&self) -> Vec<(Option<&str>, u32)> {
        match self {
            Self::Simple(quantity) => vec![(None, *quantity)],
            Self::Sized { items_by_size } => items_by_size
                .iter()
                .map(|(size, quantity)| (Some(size.as_str()), *quantity))
                .collect(),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Self::Simple(quantity) => *quantity > 0,
            Self::Sized { items_by_size } => {
                !items_by_size.is_empty() && items_by_size.values().all(|q| *q > 0)
            }
        }
    }
}

/// What a mutation did, for user-facing status messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BagChange {
    /// A new entry (or new size under an existing entry) was created.
    Added { size: Option<String> },
    /// An existing quantity was changed.
    Updated { size: Option<String>, quantity: u32 },
    /// An entry or size was deleted.
    Removed { size: Option<String> },
}

/// The session-held shopping bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ProductId, BagEntry>", into = "BTreeMap<ProductId, BagEntry>")]
pub struct Bag {
    entries: BTreeMap<ProductId, BagEntry>,
}

impl TryFrom<BTreeMap<ProductId, BagEntry>> for Bag {
    type Error = BagError;

    fn try_from(entries: BTreeMap<ProductId, BagEntry>) -> Result<Self, Self::Error> {
        if let Some((id, _)) = entries.iter().find(|(_, entry)| !entry.is_valid()) {
            return Err(BagError::InvalidSnapshot(format!(
                "product {id} has a non-positive quantity"
            )));
        }
        Ok(Self { entries })
    }
}

impl From<Bag> for BTreeMap<ProductId, BagEntry> {
    fn from(bag: Bag) -> Self {
        bag.entries
    }
}

impl Bag {
    /// An empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot produced by [`Bag::to_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `BagError::InvalidSnapshot` for malformed JSON or any
    /// non-positive quantity.
    pub fn from_snapshot(snapshot: &str) -> Result<Self, BagError> {
        serde_json::from_str(snapshot).map_err(|e| BagError::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to the canonical JSON snapshot.
    ///
    /// Keys are emitted in product-id order, so equal bags always produce
    /// byte-identical snapshots.
    #[must_use]
    pub fn to_snapshot(&self) -> String {
        // A map of integers and strings always serializes.
        serde_json::to_string(&self.entries).unwrap_or_else(|_| String::from("{}"))
    }

    /// Whether the bag holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total units across every entry.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.entries.values().map(BagEntry::total_quantity).sum()
    }

    /// Look up one product's entry.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&BagEntry> {
        self.entries.get(&product_id)
    }

    /// Iterate entries in product-id order.
    pub fn iter(&self) -> impl Iterator<Item = (ProductId, &BagEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Product IDs in the bag.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.entries.keys().copied().collect()
    }

    /// Drop every entry whose product fails the predicate. Returns the
    /// removed IDs.
    pub fn retain_products(&mut self, mut keep: impl FnMut(ProductId) -> bool) -> Vec<ProductId> {
        let removed: Vec<ProductId> = self
            .entries
            .keys()
            .copied()
            .filter(|id| !keep(*id))
            .collect();
        for id in &removed {
            self.entries.remove(id);
        }
        removed
    }

    /// Add units of a product, accumulating onto any existing quantity.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `quantity` is zero
    /// - `SizeMismatch` if the product is already in the bag with the other
    ///   size selection
    /// - `QuantityOverflow` if the new total does not fit
    pub fn add(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        size: Option<&str>,
    ) -> Result<BagChange, BagError> {
        if quantity == 0 {
            return Err(BagError::InvalidQuantity);
        }

        match (self.entries.get_mut(&product_id), size) {
            (None, None) => {
                self.entries.insert(product_id, BagEntry::Simple(quantity));
                Ok(BagChange::Added { size: None })
            }
            (None, Some(size)) => {
                let items_by_size = BTreeMap::from([(size.to_owned(), quantity)]);
                self.entries
                    .insert(product_id, BagEntry::Sized { items_by_size });
                Ok(BagChange::Added {
                    size: Some(size.to_owned()),
                })
            }
            (Some(BagEntry::Simple(existing)), None) => {
                *existing = existing
                    .checked_add(quantity)
                    .ok_or(BagError::QuantityOverflow(product_id))?;
                Ok(BagChange::Updated {
                    size: None,
                    quantity: *existing,
                })
            }
            (Some(BagEntry::Sized { items_by_size }), Some(size)) => {
                match items_by_size.get_mut(size) {
                    Some(existing) => {
                        *existing = existing
                            .checked_add(quantity)
                            .ok_or(BagError::QuantityOverflow(product_id))?;
                        Ok(BagChange::Updated {
                            size: Some(size.to_owned()),
                            quantity: *existing,
                        })
                    }
                    None => {
                        items_by_size.insert(size.to_owned(), quantity);
                        Ok(BagChange::Added {
                            size: Some(size.to_owned()),
                        })
                    }
                }
            }
            (Some(_), _) => Err(BagError::SizeMismatch(product_id)),
        }
    }

    /// Set a product's quantity to an exact value.
    ///
    /// A quantity of zero or less deletes the entry (or the size under it),
    /// exactly like [`Bag::remove`]. A positive quantity for a product not yet
    /// in the bag creates the entry.
    ///
    /// # Errors
    ///
    /// - `NotInBag` / `SizeNotInBag` when deleting something absent
    /// - `SizeMismatch` if the size selection disagrees with the entry
    pub fn adjust(
        &mut self,
        product_id: ProductId,
        quantity: i64,
        size: Option<&str>,
    ) -> Result<BagChange, BagError> {
        let Some(quantity) = u32::try_from(quantity).ok().filter(|q| *q > 0) else {
            if quantity > 0 {
                return Err(BagError::QuantityOverflow(product_id));
            }
            return self.remove(product_id, size);
        };

        match (self.entries.get_mut(&product_id), size) {
            (None, None) => {
                self.entries.insert(product_id, BagEntry::Simple(quantity));
                Ok(BagChange::Added { size: None })
            }
            (None, Some(size)) => {
                let items_by_size = BTreeMap::from([(size.to_owned(), quantity)]);
                self.entries
                    .insert(product_id, BagEntry::Sized { items_by_size });
                Ok(BagChange::Added {
                    size: Some(size.to_owned()),
                })
            }
            (Some(BagEntry::Simple(existing)), None) => {
                *existing = quantity;
                Ok(BagChange::Updated {
                    size: None,
                    quantity,
                })
            }
            (Some(BagEntry::Sized { items_by_size }), Some(size)) => {
                items_by_size.insert(size.to_owned(), quantity);
                Ok(BagChange::Updated {
                    size: Some(size.to_owned()),
                    quantity,
                })
            }
            (Some(_), _) => Err(BagError::SizeMismatch(product_id)),
        }
    }

    /// Delete a product, or one size of a sized product.
    ///
    /// Deleting the last size removes the product entry entirely. Removing a
    /// sized product without naming a size removes every size.
    ///
    /// # Errors
    ///
    /// - `NotInBag` / `SizeNotInBag` when the target is absent
    /// - `SizeMismatch` when a size is given for an unsized entry
    pub fn remove(
        &mut self,
        product_id: ProductId,
        size: Option<&str>,
    ) -> Result<BagChange, BagError> {
        let entry = self
            .entries
            .get_mut(&product_id)
            .ok_or(BagError::NotInBag(product_id))?;

        match (entry, size) {
            (BagEntry::Sized { items_by_size }, Some(size)) => {
                if items_by_size.remove(size).is_none() {
                    return Err(BagError::SizeNotInBag {
                        product_id,
                        size: size.to_owned(),
                    });
                }
                if items_by_size.is_empty() {
                    self.entries.remove(&product_id);
                }
                Ok(BagChange::Removed {
                    size: Some(size.to_owned()),
                })
            }
            (BagEntry::Simple(_), Some(_)) => Err(BagError::SizeMismatch(product_id)),
            (_, None) => {
                self.entries.remove(&product_id);
                Ok(BagChange::Removed { size: None })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pid(id: i32) -> ProductId {
        ProductId::new(id)
    }

    fn assert_positive(bag: &Bag) {
        for (_, entry) in bag.iter() {
            assert!(entry.is_valid(), "bag holds a non-positive entry: {bag:?}");
        }
    }

    #[test]
    fn test_add_accumulates_simple_quantity() {
        let mut bag = Bag::new();
        assert_eq!(
            bag.add(pid(12), 2, None).unwrap(),
            BagChange::Added { size: None }
        );
        assert_eq!(
            bag.add(pid(12), 3, None).unwrap(),
            BagChange::Updated {
                size: None,
                quantity: 5
            }
        );
        assert_eq!(bag.get(pid(12)), Some(&BagEntry::Simple(5)));
    }

    #[test]
    fn test_add_sized_creates_and_accumulates() {
        let mut bag = Bag::new();
        bag.add(pid(5), 1, Some("m")).unwrap();
        bag.add(pid(5), 2, Some("l")).unwrap();
        let change = bag.add(pid(5), 1, Some("l")).unwrap();
        assert_eq!(
            change,
            BagChange::Updated {
                size: Some("l".into()),
                quantity: 3
            }
        );
        assert_eq!(bag.total_quantity(), 4);
    }

    #[test]
    fn test_add_rejects_zero_and_mismatched_size() {
        let mut bag = Bag::new();
        assert_eq!(bag.add(pid(1), 0, None), Err(BagError::InvalidQuantity));
        bag.add(pid(1), 1, None).unwrap();
        assert_eq!(
            bag.add(pid(1), 1, Some("s")),
            Err(BagError::SizeMismatch(pid(1)))
        );
        assert!(bag.add(pid(1), u32::MAX, None).is_err());
        assert_eq!(bag.get(pid(1)), Some(&BagEntry::Simple(1)));
    }

    #[test]
    fn test_adjust_to_zero_matches_remove() {
        let mut seeded = Bag::new();
        seeded.add(pid(3), 4, None).unwrap();
        seeded.add(pid(5), 1, Some("m")).unwrap();
        seeded.add(pid(5), 2, Some("l")).unwrap();

        let mut adjusted = seeded.clone();
        let mut removed = seeded.clone();
        adjusted.adjust(pid(3), 0, None).unwrap();
        removed.remove(pid(3), None).unwrap();
        assert_eq!(adjusted, removed);

        adjusted.adjust(pid(5), -2, Some("m")).unwrap();
        removed.remove(pid(5), Some("m")).unwrap();
        assert_eq!(adjusted, removed);
    }

    #[test]
    fn test_removing_last_size_drops_product() {
        let mut bag = Bag::new();
        bag.add(pid(5), 1, Some("m")).unwrap();
        bag.remove(pid(5), Some("m")).unwrap();
        assert!(bag.is_empty());

        assert_eq!(bag.remove(pid(5), Some("m")), Err(BagError::NotInBag(pid(5))));
    }

    #[test]
    fn test_remove_missing_size_leaves_bag_untouched() {
        let mut bag = Bag::new();
        bag.add(pid(5), 1, Some("m")).unwrap();
        let before = bag.clone();
        assert!(matches!(
            bag.remove(pid(5), Some("xl")),
            Err(BagError::SizeNotInBag { .. })
        ));
        assert_eq!(bag, before);
    }

    #[test]
    fn test_mutation_sequences_never_store_non_positive() {
        let mut bag = Bag::new();
        let sizes = [None, Some("s"), Some("m")];
        for step in 0_i64..200 {
            let id = pid(i32::try_from(step % 4).unwrap());
            let size = sizes[usize::try_from(step % 3).unwrap()];
            let _ = match step % 5 {
                0 | 1 => bag.add(id, u32::try_from(step % 3).unwrap(), size),
                2 => bag.adjust(id, (step % 7) - 3, size),
                _ => bag.remove(id, size),
            };
            assert_positive(&bag);
        }
    }

    #[test]
    fn test_snapshot_shape_and_round_trip() {
        let mut bag = Bag::new();
        bag.add(pid(12), 2, None).unwrap();
        bag.add(pid(5), 1, Some("m")).unwrap();
        bag.add(pid(5), 2, Some("l")).unwrap();

        let snapshot = bag.to_snapshot();
        assert_eq!(
            snapshot,
            r#"{"5":{"items_by_size":{"l":2,"m":1}},"12":2}"#
        );
        assert_eq!(Bag::from_snapshot(&snapshot).unwrap(), bag);
    }

    #[test]
    fn test_snapshot_rejects_zero_quantities() {
        assert!(Bag::from_snapshot(r#"{"1":0}"#).is_err());
        assert!(Bag::from_snapshot(r#"{"1":{"items_by_size":{}}}"#).is_err());
        assert!(Bag::from_snapshot(r#"{"1":-1}"#).is_err());
        assert!(Bag::from_snapshot("not json").is_err());
    }

    #[test]
    fn test_retain_products_reports_removed_ids() {
        let mut bag = Bag::new();
        bag.add(pid(1), 1, None).unwrap();
        bag.add(pid(2), 1, None).unwrap();
        let removed = bag.retain_products(|id| id != pid(2));
        assert_eq!(removed, vec![pid(2)]);
        assert_eq!(bag.product_ids(), vec![pid(1)]);
    }
}
