//! JSON result bodies handed back to callers.
//!
//! Every service result folds into a `{ "success": bool, ..., "error": ... }`
//! body. Internal failures are logged here and reported with a generic
//! message.

use crate::cart::CartView;
use crate::checkout::CheckoutReceipt;
use crate::error::{ShopError, ShopResult};
use serde::Serialize;
use turbo_commerce::cart::{CartItem, UnavailableItem};
use turbo_commerce::checkout::{Order, OrderStatus};
use turbo_commerce::{CommerceError, ErrorKind, Money, OrderId};

/// The failure half of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ShopError> for ErrorBody {
    fn from(err: &ShopError) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %err, "Internal error");
        } else {
            tracing::debug!(error = %err, ?kind, "Request rejected");
        }
        Self {
            kind,
            message: err.user_message(),
        }
    }
}

/// Cart read or mutation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_total: Option<Money>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<CartItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub unavailable_items: Vec<UnavailableItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl From<ShopResult<CartView>> for CartResponse {
    fn from(result: ShopResult<CartView>) -> Self {
        match result {
            Ok(view) => Self {
                success: true,
                total: Some(view.summary.total),
                new_total: Some(view.summary.new_total),
                items: view.summary.items,
                coupon_code: view.summary.coupon_code,
                unavailable_items: view.summary.unavailable_items,
                notice: view.notice,
                error: None,
            },
            Err(err) => {
                let unavailable_items = match &err {
                    ShopError::Commerce(CommerceError::CartUnavailable(items)) => items.clone(),
                    _ => Vec::new(),
                };
                Self {
                    success: false,
                    total: None,
                    new_total: None,
                    items: Vec::new(),
                    coupon_code: None,
                    unavailable_items,
                    notice: None,
                    error: Some(ErrorBody::from(&err)),
                }
            }
        }
    }
}

/// Checkout result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Money>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable_items: Vec<UnavailableItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl From<ShopResult<CheckoutReceipt>> for CheckoutResponse {
    fn from(result: ShopResult<CheckoutReceipt>) -> Self {
        match result {
            Ok(receipt) => Self {
                success: true,
                order_id: Some(receipt.order_id),
                display_id: Some(receipt.display_id),
                total: Some(receipt.total),
                unavailable_items: Vec::new(),
                error: None,
            },
            Err(err) => {
                let unavailable_items = match &err {
                    ShopError::Commerce(CommerceError::CartUnavailable(items)) => items.clone(),
                    _ => Vec::new(),
                };
                Self {
                    success: false,
                    order_id: None,
                    display_id: None,
                    total: None,
                    unavailable_items,
                    error: Some(ErrorBody::from(&err)),
                }
            }
        }
    }
}

/// Order lifecycle result: the order's status and its total after the
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_total: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl From<ShopResult<Order>> for OrderResponse {
    fn from(result: ShopResult<Order>) -> Self {
        match result {
            Ok(order) => Self {
                success: true,
                status: Some(order.status),
                new_total: Some(order.total_amount),
                refunded: Some(order.refunded),
                error: None,
            },
            Err(err) => Self {
                success: false,
                status: None,
                new_total: None,
                refunded: None,
                error: Some(ErrorBody::from(&err)),
            },
        }
    }
}
