//! Payment methods and consumed-payment records.

use crate::error::CommerceError;
use crate::ids::{OrderId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cash on delivery ceiling, in major currency units.
pub const COD_LIMIT_MAJOR: i64 = 1000;

/// Identifiers returned by the gateway after the customer paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    pub gateway_order_id: String,
    pub payment_id: String,
    /// Hex HMAC-SHA256 of `gateway_order_id|payment_id`.
    pub signature: String,
}

impl GatewayPayment {
    /// The string the gateway signs.
    pub fn signed_payload(&self) -> String {
        format!("{}|{}", self.gateway_order_id, self.payment_id)
    }
}

/// How the customer pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Wallet,
    Gateway(GatewayPayment),
}

impl PaymentMethod {
    pub fn kind(&self) -> PaymentKind {
        match self {
            PaymentMethod::CashOnDelivery => PaymentKind::CashOnDelivery,
            PaymentMethod::Wallet => PaymentKind::Wallet,
            PaymentMethod::Gateway(_) => PaymentKind::Gateway,
        }
    }

    /// Gateway payment id, if any.
    pub fn payment_id(&self) -> Option<&str> {
        match self {
            PaymentMethod::Gateway(p) => Some(&p.payment_id),
            _ => None,
        }
    }
}

/// Payment method recorded on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    CashOnDelivery,
    Wallet,
    Gateway,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::CashOnDelivery => "cod",
            PaymentKind::Wallet => "wallet",
            PaymentKind::Gateway => "gateway",
        }
    }

    /// Prepaid orders are refunded to the wallet on cancellation.
    pub fn is_prepaid(&self) -> bool {
        !matches!(self, PaymentKind::CashOnDelivery)
    }
}

/// Reject cash on delivery above `limit`.
pub fn check_cod_limit(total: &Money, limit: &Money) -> Result<(), CommerceError> {
    if total.amount_minor > limit.amount_minor {
        return Err(CommerceError::CodLimitExceeded {
            limit: *limit,
            total: *total,
        });
    }
    Ok(())
}

/// What happened to a gateway payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Turned into an order.
    Committed { order_id: OrderId, display_id: String },
    /// Local commit failed; the amount went back to the wallet.
    Refunded { reason: String },
}

/// A gateway payment that has been used, keyed by payment id in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub gateway_order_id: String,
    pub user_id: UserId,
    pub amount: Money,
    pub outcome: PaymentOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Order created by this payment, if it committed.
    pub fn committed_order(&self) -> Option<(&OrderId, &str)> {
        match &self.outcome {
            PaymentOutcome::Committed { order_id, display_id } => {
                Some((order_id, display_id.as_str()))
            }
            PaymentOutcome::Refunded { .. } => None,
        }
    }
}
