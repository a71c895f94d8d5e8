//! Commerce error types.

use crate::cart::UnavailableItem;
use crate::ids::{LineItemId, OrderItemId, ProductId};
use crate::money::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape, rejected before touching the store.
    Validation,
    /// Product, variant, cart item or order absent.
    NotFound,
    /// Optimistic version mismatch or insufficient availability.
    StockConflict,
    /// Reservation TTL exceeded.
    ReservationExpired,
    /// Signature mismatch, insufficient wallet balance, gateway failure.
    Payment,
    /// Illegal state transition.
    StateConflict,
    /// Anything unexpected.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StockConflict => "stock_conflict",
            ErrorKind::ReservationExpired => "reservation_expired",
            ErrorKind::Payment => "payment_error",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Errors that can occur in e-commerce operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommerceError {
    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid quantity.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Quantity exceeds maximum allowed.
    #[error("Quantity {0} exceeds maximum allowed ({1})")]
    QuantityExceedsLimit(i64, i64),

    /// Product not found or not stock-tracked.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Size not offered by the product.
    #[error("Size {size} not found for product {product_id}")]
    VariantNotFound { product_id: ProductId, size: String },

    /// Item not in cart.
    #[error("Item not in cart: {0}")]
    ItemNotInCart(LineItemId),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Order item not found.
    #[error("Order item not found: {0}")]
    OrderItemNotFound(OrderItemId),

    /// Nothing left to reserve for this size.
    #[error("{product_id} (size {size}) is out of stock")]
    OutOfStock { product_id: ProductId, size: String },

    /// Fewer units available than requested.
    #[error("Only {available} items available for {product_id} (size {size})")]
    InsufficientStock {
        product_id: ProductId,
        size: String,
        requested: i64,
        available: i64,
    },

    /// Concurrent writers kept winning the race for this size. `available`
    /// is a fresh read taken after giving up.
    #[error("Stock for {product_id} (size {size}) keeps changing, {available} available now")]
    StockConflict {
        product_id: ProductId,
        size: String,
        available: i64,
    },

    /// Items in the cart can no longer be bought as they are.
    #[error("{} item(s) in your cart are no longer available", .0.len())]
    CartUnavailable(Vec<UnavailableItem>),

    /// Cart is empty.
    #[error("Cart is empty")]
    EmptyCart,

    /// The amount the customer saw no longer matches the cart.
    #[error("Cart total changed from {expected} to {actual}")]
    TotalChanged { expected: Money, actual: Money },

    /// Gateway signature did not verify.
    #[error("Invalid payment signature")]
    InvalidPaymentSignature,

    /// Wallet balance below the amount due.
    #[error("Insufficient wallet balance: {required} required, {available} available")]
    InsufficientBalance { required: Money, available: Money },

    /// Cash on delivery not allowed above the limit.
    #[error("Cash on delivery is not available for orders above {limit} (order total {total})")]
    CodLimitExceeded { limit: Money, total: Money },

    /// Gateway payment already used by a failed checkout.
    #[error("Payment {0} has already been processed")]
    PaymentAlreadyConsumed(String),

    /// Coupon code unknown or inactive.
    #[error("Invalid coupon code: {0}")]
    CouponInvalid(String),

    /// Coupon outside its validity window.
    #[error("Coupon expired: {0}")]
    CouponExpired(String),

    /// Coupon already used by this customer.
    #[error("Coupon already used: {0}")]
    CouponAlreadyUsed(String),

    /// Cart total below the coupon's minimum purchase.
    #[error("Coupon {code} requires a minimum purchase of {minimum}")]
    CouponMinimumNotMet { code: String, minimum: Money },

    /// Order status transition not allowed.
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Order already cancelled.
    #[error("Order {0} is already cancelled")]
    AlreadyCancelled(String),

    /// Order item already cancelled.
    #[error("Order item {0} is already cancelled")]
    ItemAlreadyCancelled(OrderItemId),

    /// Invalid checkout state transition.
    #[error("Invalid checkout transition from {from} to {to}")]
    InvalidCheckoutTransition { from: String, to: String },

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow.
    #[error("Arithmetic overflow in money calculation")]
    Overflow,
}

impl CommerceError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommerceError::Validation(_)
            | CommerceError::InvalidQuantity(_)
            | CommerceError::QuantityExceedsLimit(..)
            | CommerceError::EmptyCart
            | CommerceError::TotalChanged { .. }
            | CommerceError::CouponInvalid(_)
            | CommerceError::CouponExpired(_)
            | CommerceError::CouponAlreadyUsed(_)
            | CommerceError::CouponMinimumNotMet { .. }
            | CommerceError::CurrencyMismatch { .. } => ErrorKind::Validation,

            CommerceError::ProductNotFound(_)
            | CommerceError::VariantNotFound { .. }
            | CommerceError::ItemNotInCart(_)
            | CommerceError::OrderNotFound(_)
            | CommerceError::OrderItemNotFound(_) => ErrorKind::NotFound,

            CommerceError::OutOfStock { .. }
            | CommerceError::InsufficientStock { .. }
            | CommerceError::StockConflict { .. } => ErrorKind::StockConflict,

            CommerceError::CartUnavailable(items) => {
                if !items.is_empty() && items.iter().all(|i| i.reason.is_expiry()) {
                    ErrorKind::ReservationExpired
                } else {
                    ErrorKind::StockConflict
                }
            }

            CommerceError::InvalidPaymentSignature
            | CommerceError::InsufficientBalance { .. }
            | CommerceError::CodLimitExceeded { .. }
            | CommerceError::PaymentAlreadyConsumed(_) => ErrorKind::Payment,

            CommerceError::InvalidTransition { .. }
            | CommerceError::AlreadyCancelled(_)
            | CommerceError::ItemAlreadyCancelled(_)
            | CommerceError::InvalidCheckoutTransition { .. } => ErrorKind::StateConflict,

            CommerceError::Overflow => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::UnavailableReason;

    #[test]
    fn test_insufficient_stock_message_reports_available() {
        let err = CommerceError::InsufficientStock {
            product_id: ProductId::new("tee"),
            size: "M".into(),
            requested: 3,
            available: 2,
        };
        assert!(err.to_string().starts_with("Only 2 items available"));
        assert_eq!(err.kind(), ErrorKind::StockConflict);
    }

    #[test]
    fn test_stock_conflict_reports_fresh_availability() {
        let err = CommerceError::StockConflict {
            product_id: ProductId::new("tee"),
            size: "M".into(),
            available: 4,
        };
        assert!(err.to_string().ends_with("4 available now"));
        assert_eq!(err.kind(), ErrorKind::StockConflict);
    }

    #[test]
    fn test_cart_unavailable_kind() {
        let expired = UnavailableItem {
            product_id: ProductId::new("tee"),
            size: "M".into(),
            reason: UnavailableReason::Expired,
        };
        let deleted = UnavailableItem {
            product_id: ProductId::new("cap"),
            size: "L".into(),
            reason: UnavailableReason::ProductDeleted,
        };
        assert_eq!(
            CommerceError::CartUnavailable(vec![expired.clone()]).kind(),
            ErrorKind::ReservationExpired
        );
        assert_eq!(
            CommerceError::CartUnavailable(vec![expired, deleted]).kind(),
            ErrorKind::StockConflict
        );
    }
}
