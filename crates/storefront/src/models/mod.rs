//! Domain models for the storefront.

pub mod flash;
pub mod order;
pub mod profile;
pub mod session;

pub use flash::{FlashLevel, FlashMessage};
pub use order::{NewLineItem, NewOrder, Order, OrderInsert, OrderLineItem, OrderMatch};
pub use profile::{ProfileDefaults, UserProfile};
pub use session::{CurrentUser, keys as session_keys};
