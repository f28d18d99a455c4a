//! Status enums for orders.

use serde::{Deserialize, Serialize};

/// Which request flow created an order row.
///
/// The synchronous checkout submission and the asynchronous payment webhook
/// race to record the same payment; whichever inserts first wins and the
/// origin records which one it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_origin", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Created by the customer's checkout form submission.
    Checkout,
    /// Created by the payment-succeeded webhook fallback.
    Webhook,
}

impl std::fmt::Display for OrderOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkout => write!(f, "checkout"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

impl std::str::FromStr for OrderOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout" => Ok(Self::Checkout),
            "webhook" => Ok(Self::Webhook),
            _ => Err(format!("invalid order origin: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_origin_round_trips_through_display() {
        for origin in [OrderOrigin::Checkout, OrderOrigin::Webhook] {
            assert_eq!(origin.to_string().parse::<OrderOrigin>().unwrap(), origin);
        }
        assert!("admin".parse::<OrderOrigin>().is_err());
    }
}
