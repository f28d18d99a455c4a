//! Kestrel Core - Shared domain library.
//!
//! This crate provides the domain model used across all Kestrel components:
//! - `storefront` - Public-facing shop, bag, checkout and payment webhook
//! - `cli` - Command-line tools for migrations, seeding and order lookup
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. Bag mutation and bag pricing live here so both the
//! request handlers and the payment reconciler compute identical totals.
//!
//! # Modules
//!
//! - [`bag`] - The session shopping bag and its mutations
//! - [`catalog`] - Products and categories
//! - [`pricing`] - Delivery policy and the priced bag view
//! - [`types`] - Newtype wrappers for IDs, money, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bag;
pub mod catalog;
pub mod pricing;
pub mod types;

pub use bag::{Bag, BagChange, BagEntry, BagError};
pub use catalog::{Category, PRODUCT_SIZES, Product};
pub use pricing::{BagContext, BagLine, DeliveryPolicy, MissingProducts};
pub use types::*;
