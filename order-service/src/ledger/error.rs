//! Business-rule errors raised by the pure ledger functions.

use crate::models::OrderStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Input the caller can correct. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Quantity must be at least 1, got {quantity}")]
    InvalidQuantity { quantity: i32 },

    #[error("Unit price must not be negative, got {unit_price}")]
    InvalidPrice { unit_price: Decimal },

    #[error("Discount must not be negative, got {discount}")]
    InvalidDiscount { discount: Decimal },

    #[error("Amount exceeds the maximum of {limit}")]
    AmountOutOfRange { limit: Decimal },

    #[error("Discount {discount} exceeds order total {gross_total}")]
    DiscountExceedsTotal {
        discount: Decimal,
        gross_total: Decimal,
    },
}

/// Lifecycle violations, surfaced to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order has been delivered and can no longer be changed")]
    OrderTerminal,

    #[error("Order is already delivered")]
    AlreadyTerminal,
}
