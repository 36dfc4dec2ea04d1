//! Domain primitives for the storefront resources.
//!
//! Statuses are persisted as their variant names. Parsing is strict so a
//! typo in a status update is rejected instead of silently stored.

pub mod numbers;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|status| status.as_str() == s)
                    .ok_or_else(|| UnknownStatus {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

status_enum!(
    /// Lifecycle of an order from checkout to hand-over.
    OrderStatus,
    "order",
    [Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded]
);

status_enum!(
    PaymentStatus,
    "payment",
    [Pending, Processing, Completed, Failed, Refunded, Cancelled]
);

status_enum!(ProductStatus, "product", [InStock, OutOfStock, Discontinued]);

impl OrderStatus {
    #[must_use]
    pub const fn can_cancel(self) -> bool {
        !matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Orders the delivery team can act on.
    #[must_use]
    pub const fn is_in_delivery(self) -> bool {
        matches!(self, Self::Processing | Self::Shipped)
    }
}

impl PaymentStatus {
    #[must_use]
    pub const fn can_refund(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// A completed payment is final except for a refund.
    #[must_use]
    pub const fn is_mutable(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl ProductStatus {
    #[must_use]
    pub const fn for_stock(quantity: i32) -> Self {
        if quantity > 0 {
            Self::InStock
        } else {
            Self::OutOfStock
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(*status));
        }
        for status in PaymentStatus::ALL {
            assert_eq!(status.to_string().parse::<PaymentStatus>(), Ok(*status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "Paid".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.kind, "payment");
        assert_eq!(err.to_string(), "Unknown payment status: Paid");
    }

    #[test]
    fn order_transitions() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());

        assert!(OrderStatus::Processing.is_in_delivery());
        assert!(OrderStatus::Shipped.is_in_delivery());
        assert!(!OrderStatus::Pending.is_in_delivery());
    }

    #[test]
    fn payment_transitions() {
        assert!(PaymentStatus::Completed.can_refund());
        assert!(!PaymentStatus::Pending.can_refund());
        assert!(!PaymentStatus::Completed.is_mutable());
        assert!(PaymentStatus::Failed.is_mutable());
    }

    #[test]
    fn product_status_follows_stock() {
        assert_eq!(ProductStatus::for_stock(3), ProductStatus::InStock);
        assert_eq!(ProductStatus::for_stock(0), ProductStatus::OutOfStock);
    }
}
