//! Session-related types.

use serde::{Deserialize, Serialize};

use kestrel_core::{Email, UserId};

/// Session-stored user identity.
///
/// Written by the authentication layer that fronts the storefront; the
/// storefront only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// Login name, also sent to Stripe in payment metadata.
    pub username: String,
    /// Account email, used to pre-fill checkout.
    #[serde(default)]
    pub email: Option<Email>,
    /// Display name, used to pre-fill checkout.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the shopping bag.
    pub const BAG: &str = "bag";

    /// Key for the "save delivery info to my profile" checkbox, remembered
    /// between checkout submission and the success page.
    pub const SAVE_INFO: &str = "save_info";

    /// Key for queued flash messages.
    pub const MESSAGES: &str = "messages";
}
