//! Core types for Kestrel.
//!
//! Type-safe wrappers for IDs, money, emails, shipping details and statuses.

pub mod email;
pub mod id;
pub mod price;
pub mod shipping;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, from_minor_units, round_money, to_minor_units};
pub use shipping::{ShippingDetails, non_empty};
pub use status::*;
