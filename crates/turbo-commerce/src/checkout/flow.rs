//! Checkout attempt state machine.

use crate::CommerceError;
use serde::{Deserialize, Serialize};

/// Stages of one checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStage {
    /// Cart re-validated against stock, offers and TTL.
    CartValidated,
    /// Gateway order created, waiting for the customer to pay.
    PaymentAuthorizing,
    /// Signature verified, wallet debited, or COD accepted.
    PaymentVerified,
    /// Order written, stock decremented, cart cleared.
    OrderCommitted,
    /// Failed before any money moved; nothing changed.
    CartUnchanged,
    /// Failed after the gateway took money; reservations released and the
    /// amount credited back.
    Compensated,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::CartValidated => "CART_VALIDATED",
            CheckoutStage::PaymentAuthorizing => "PAYMENT_AUTHORIZING",
            CheckoutStage::PaymentVerified => "PAYMENT_VERIFIED",
            CheckoutStage::OrderCommitted => "ORDER_COMMITTED",
            CheckoutStage::CartUnchanged => "CART_UNCHANGED",
            CheckoutStage::Compensated => "COMPENSATED",
        }
    }

    /// Check if this stage ends the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutStage::OrderCommitted
                | CheckoutStage::CartUnchanged
                | CheckoutStage::Compensated
        )
    }

    fn can_move_to(&self, next: CheckoutStage) -> bool {
        use CheckoutStage::*;
        matches!(
            (self, next),
            (CartValidated, PaymentAuthorizing)
                | (CartValidated, PaymentVerified)
                | (CartValidated, CartUnchanged)
                | (PaymentAuthorizing, PaymentVerified)
                | (PaymentAuthorizing, CartUnchanged)
                | (PaymentVerified, OrderCommitted)
                | (PaymentVerified, CartUnchanged)
                | (PaymentVerified, Compensated)
        )
    }
}

impl std::fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One checkout attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutAttempt {
    /// Current stage.
    pub stage: CheckoutStage,
    /// Stages passed through, oldest first.
    pub history: Vec<CheckoutStage>,
}

impl Default for CheckoutAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutAttempt {
    /// Start an attempt on a validated cart.
    pub fn new() -> Self {
        Self {
            stage: CheckoutStage::CartValidated,
            history: vec![CheckoutStage::CartValidated],
        }
    }

    /// Move to `next`.
    pub fn advance(&mut self, next: CheckoutStage) -> Result<(), CommerceError> {
        if !self.stage.can_move_to(next) {
            return Err(CommerceError::InvalidCheckoutTransition {
                from: self.stage.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to the failure exit that matches how far the attempt got.
    ///
    /// Returns the stage reached.
    pub fn fail(&mut self, money_taken: bool) -> CheckoutStage {
        let exit = if money_taken && self.stage == CheckoutStage::PaymentVerified {
            CheckoutStage::Compensated
        } else {
            CheckoutStage::CartUnchanged
        };
        if self.stage.can_move_to(exit) {
            self.stage = exit;
            self.history.push(exit);
        }
        self.stage
    }
}
