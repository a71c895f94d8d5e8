//! Order types and the post-purchase lifecycle.

use crate::checkout::PaymentKind;
use crate::error::CommerceError;
use crate::ids::{AddressId, OrderId, OrderItemId, ProductId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, awaiting processing.
    #[default]
    Pending,
    /// Order being prepared.
    Processing,
    /// Order shipped.
    Shipped,
    /// Order delivered.
    Delivered,
    /// Order cancelled.
    Cancelled,
    /// Customer asked to return a delivered order.
    ReturnRequested,
    /// Return accepted; stock restored and refunded.
    Returned,
    /// Return refused.
    ReturnRejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::ReturnRequested => "return_requested",
            OrderStatus::Returned => "returned",
            OrderStatus::ReturnRejected => "return_rejected",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::ReturnRequested => "Return Requested",
            OrderStatus::Returned => "Returned",
            OrderStatus::ReturnRejected => "Return Rejected",
        }
    }

    /// Check if order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::ReturnRejected
        )
    }

    /// Check if order can be cancelled (any pre-delivery state).
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Shipped
        )
    }

    /// Next step of the fulfilment path.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            _ => None,
        }
    }
}

/// Status of one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Active,
    Cancelled,
    Returned,
}

/// A line in an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Unique line identifier.
    pub id: OrderItemId,
    /// Product ID.
    pub product_id: ProductId,
    /// Product name at time of order.
    pub name: String,
    /// Variant size.
    pub size: String,
    /// Quantity ordered.
    pub quantity: i64,
    /// Unit price at time of order.
    pub unit_price: Money,
    /// Line status.
    pub status: ItemStatus,
    /// Why the line was cancelled.
    pub cancel_reason: Option<String>,
}

impl OrderItem {
    /// `unit_price * quantity`.
    pub fn line_total(&self) -> Result<Money, CommerceError> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or(CommerceError::Overflow)
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

/// Units to put back on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
}

/// Side effects of a lifecycle transition, applied by the caller in the same
/// transaction as the order write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reversal {
    /// Stock to restore.
    pub restock: Vec<Restock>,
    /// Amount to credit to the wallet (zero for cash on delivery).
    pub refund: Money,
}

impl Reversal {
    fn empty(order: &Order) -> Self {
        Self {
            restock: Vec::new(),
            refund: Money::zero(order.total_amount.currency),
        }
    }
}

/// A completed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,
    /// Human-readable order number (e.g., "ORD-000042").
    pub display_id: String,
    /// Customer.
    pub user_id: UserId,
    /// Lines in the order.
    pub items: Vec<OrderItem>,
    /// Shipping address reference.
    pub address_id: AddressId,
    /// Amount still owed/paid after cancellations.
    pub total_amount: Money,
    /// Coupon redeemed, if any.
    pub coupon_code: Option<String>,
    /// Coupon discount at purchase time.
    pub discount: Money,
    /// How the order was paid.
    pub payment_method: PaymentKind,
    /// Gateway payment id, for gateway orders.
    pub payment_id: Option<String>,
    /// Order status.
    pub status: OrderStatus,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
    /// Return reason.
    pub return_reason: Option<String>,
    /// Total credited back to the wallet so far.
    pub refunded: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Format an order sequence number.
pub fn display_id(sequence: u64) -> String {
    format!("ORD-{sequence:06}")
}

impl Order {
    /// Get an item by id.
    pub fn item(&self, id: &OrderItemId) -> Result<&OrderItem, CommerceError> {
        self.items
            .iter()
            .find(|i| &i.id == id)
            .ok_or_else(|| CommerceError::OrderItemNotFound(id.clone()))
    }

    fn refund_for(&self, amount: Money) -> Money {
        if self.payment_method.is_prepaid() {
            amount
        } else {
            Money::zero(amount.currency)
        }
    }

    fn record_refund(&mut self, refund: &Money) -> Result<(), CommerceError> {
        self.refunded = self
            .refunded
            .checked_add(refund)
            .ok_or(CommerceError::Overflow)?;
        Ok(())
    }

    fn transition_error(&self, to: OrderStatus) -> CommerceError {
        CommerceError::InvalidTransition {
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    /// Move along Pending → Processing → Shipped → Delivered.
    pub fn advance_status(&mut self, now: DateTime<Utc>) -> Result<OrderStatus, CommerceError> {
        let next = self
            .status
            .next()
            .ok_or_else(|| self.transition_error(OrderStatus::Delivered))?;
        self.status = next;
        self.updated_at = now;
        Ok(next)
    }

    /// Cancel the whole order.
    ///
    /// Restores every active line and refunds the remaining total for
    /// prepaid orders.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<Reversal, CommerceError> {
        if self.status == OrderStatus::Cancelled {
            return Err(CommerceError::AlreadyCancelled(self.display_id.clone()));
        }
        if !self.status.can_cancel() {
            return Err(self.transition_error(OrderStatus::Cancelled));
        }

        let mut reversal = Reversal::empty(self);
        for item in self.items.iter_mut().filter(|i| i.status == ItemStatus::Active) {
            reversal.restock.push(Restock {
                product_id: item.product_id.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
            });
            item.status = ItemStatus::Cancelled;
            item.cancel_reason = Some(reason.to_string());
        }
        reversal.refund = self.refund_for(self.total_amount);
        self.record_refund(&reversal.refund)?;

        self.status = OrderStatus::Cancelled;
        self.cancel_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(reversal)
    }

    /// Cancel one line.
    ///
    /// The line's `price * quantity` comes off `total_amount`, capped at what
    /// is left of it. Cancelling the last active line takes whatever remains
    /// and cancels the order. Prepaid orders are refunded exactly the amount
    /// taken off.
    pub fn cancel_item(
        &mut self,
        item_id: &OrderItemId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Reversal, CommerceError> {
        let item = self.item(item_id)?;
        if !item.is_active() {
            return Err(CommerceError::ItemAlreadyCancelled(item_id.clone()));
        }
        if self.status == OrderStatus::Cancelled {
            return Err(CommerceError::AlreadyCancelled(self.display_id.clone()));
        }
        if !self.status.can_cancel() {
            return Err(self.transition_error(OrderStatus::Cancelled));
        }

        let line_total = item.line_total()?;
        let restock = Restock {
            product_id: item.product_id.clone(),
            size: item.size.clone(),
            quantity: item.quantity,
        };
        let last_active = self.items.iter().filter(|i| i.is_active()).count() == 1;

        let share = if last_active {
            self.total_amount
        } else {
            line_total.min(self.total_amount)
        };

        self.total_amount = self
            .total_amount
            .checked_sub(&share)
            .ok_or(CommerceError::Overflow)?;
        let refund = self.refund_for(share);
        self.record_refund(&refund)?;

        if let Some(item) = self.items.iter_mut().find(|i| &i.id == item_id) {
            item.status = ItemStatus::Cancelled;
            item.cancel_reason = Some(reason.to_string());
        }
        if last_active {
            self.status = OrderStatus::Cancelled;
            self.cancel_reason = Some(reason.to_string());
        }
        self.updated_at = now;

        Ok(Reversal {
            restock: vec![restock],
            refund,
        })
    }

    /// Ask to return a delivered order.
    pub fn request_return(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        if self.status != OrderStatus::Delivered {
            return Err(self.transition_error(OrderStatus::ReturnRequested));
        }
        self.status = OrderStatus::ReturnRequested;
        self.return_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Accept or reject a pending return.
    ///
    /// Accepting restores stock and refunds the remaining total to the wallet
    /// whatever the payment method, since a delivered order has been paid.
    pub fn resolve_return(
        &mut self,
        accept: bool,
        now: DateTime<Utc>,
    ) -> Result<Reversal, CommerceError> {
        let target = if accept {
            OrderStatus::Returned
        } else {
            OrderStatus::ReturnRejected
        };
        if self.status != OrderStatus::ReturnRequested {
            return Err(self.transition_error(target));
        }

        let mut reversal = Reversal::empty(self);
        if accept {
            for item in self.items.iter_mut().filter(|i| i.status == ItemStatus::Active) {
                reversal.restock.push(Restock {
                    product_id: item.product_id.clone(),
                    size: item.size.clone(),
                    quantity: item.quantity,
                });
                item.status = ItemStatus::Returned;
            }
            reversal.refund = self.total_amount;
            self.record_refund(&reversal.refund)?;
        }

        self.status = target;
        self.updated_at = now;
        Ok(reversal)
    }
}
