//! Cart and cart line types.

use crate::cart::AppliedCoupon;
use crate::error::CommerceError;
use crate::ids::{LineItemId, ProductId, UserId};
use crate::money::{Currency, Money};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Maximum quantity allowed per cart line.
pub const MAX_QUANTITY_PER_ITEM: i64 = 10;

/// How long a cart line holds its stock.
pub const RESERVATION_TTL_SECS: i64 = 600;

/// Default reservation TTL as a duration.
pub fn reservation_ttl() -> Duration {
    Duration::seconds(RESERVATION_TTL_SECS)
}

/// A line in a cart. `{quantity, reserved_at}` is the reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    /// Unique line identifier.
    pub id: LineItemId,
    /// Product reference.
    pub product_id: ProductId,
    /// Variant size.
    pub size: String,
    /// Units held (>= 1).
    pub quantity: i64,
    /// Unit price snapshot from the last mutation.
    pub unit_price: Money,
    /// When the reservation was taken or last refreshed.
    pub reserved_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(
        product_id: ProductId,
        size: impl Into<String>,
        quantity: i64,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LineItemId::generate(),
            product_id,
            size: size.into(),
            quantity,
            unit_price,
            reserved_at: now,
        }
    }

    /// `unit_price * quantity`.
    pub fn line_total(&self) -> Result<Money, CommerceError> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or(CommerceError::Overflow)
    }

    /// True once `reserved_at < now - ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.reserved_at < now - ttl
    }

    /// Refresh the reservation timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.reserved_at = now;
    }
}

/// A user's cart.
///
/// `total` is the sum before the coupon; `new_total` is the amount due after
/// it, equal to `total` while no coupon is applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cart {
    /// Owner.
    pub user_id: UserId,
    /// Cart currency.
    pub currency: Currency,
    /// Lines in insertion order.
    pub items: Vec<CartItem>,
    /// Price sum before coupon.
    pub total: Money,
    /// Price sum after coupon.
    pub new_total: Money,
    /// Applied coupon, if any.
    #[serde(default)]
    pub coupon: Option<AppliedCoupon>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Create an empty cart for a user.
    pub fn new(user_id: UserId, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            currency,
            items: Vec::new(),
            total: Money::zero(currency),
            new_total: Money::zero(currency),
            coupon: None,
            updated_at: now,
        }
    }

    /// Check if the cart is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units in the cart.
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Find the line for `(product, size)`.
    pub fn find_line(&self, product_id: &ProductId, size: &str) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|i| &i.product_id == product_id && i.size == size)
    }

    /// Get a line by id.
    pub fn item(&self, id: &LineItemId) -> Result<&CartItem, CommerceError> {
        self.items
            .iter()
            .find(|i| &i.id == id)
            .ok_or_else(|| CommerceError::ItemNotInCart(id.clone()))
    }

    /// Get a mutable line by id.
    pub fn item_mut(&mut self, id: &LineItemId) -> Result<&mut CartItem, CommerceError> {
        self.items
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| CommerceError::ItemNotInCart(id.clone()))
    }

    /// Remove a line and return it.
    pub fn take_line(&mut self, id: &LineItemId) -> Result<CartItem, CommerceError> {
        let index = self
            .items
            .iter()
            .position(|i| &i.id == id)
            .ok_or_else(|| CommerceError::ItemNotInCart(id.clone()))?;
        Ok(self.items.remove(index))
    }

    /// Ids of lines whose reservation has expired.
    pub fn expired_items(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<LineItemId> {
        self.items
            .iter()
            .filter(|i| i.is_expired(now, ttl))
            .map(|i| i.id.clone())
            .collect()
    }

    /// True if any line has expired.
    pub fn has_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.items.iter().any(|i| i.is_expired(now, ttl))
    }

    /// Store a freshly computed pre-coupon total.
    ///
    /// `new_total` follows `total` only while no coupon is applied; an
    /// applied coupon owns `new_total`.
    pub fn set_total(&mut self, total: Money) {
        self.total = total;
        if self.coupon.is_none() {
            self.new_total = total;
        }
    }

    /// Empty the cart after a successful checkout.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.total = Money::zero(self.currency);
        self.new_total = Money::zero(self.currency);
        self.coupon = None;
        self.updated_at = now;
    }

    /// Snapshot for the outward result types and the session mirror.
    pub fn summary(&self, unavailable: Vec<UnavailableItem>) -> CartSummary {
        CartSummary {
            user_id: self.user_id.clone(),
            items: self.items.clone(),
            total: self.total,
            new_total: self.new_total,
            coupon_code: self.coupon.as_ref().map(|c| c.code.clone()),
            unavailable_items: unavailable,
        }
    }
}

/// Why a cart line can't be bought as it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Reservation TTL exceeded; the line was released.
    Expired,
    /// Stock dropped below the line's quantity.
    InsufficientStock,
    /// The size is no longer offered.
    SizeRemoved,
    /// The product is gone or no longer sold.
    ProductDeleted,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::Expired => "expired",
            UnavailableReason::InsufficientStock => "insufficient_stock",
            UnavailableReason::SizeRemoved => "size_removed",
            UnavailableReason::ProductDeleted => "product_deleted",
        }
    }

    /// True for the TTL case.
    pub fn is_expiry(&self) -> bool {
        matches!(self, UnavailableReason::Expired)
    }
}

/// One unavailable line, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableItem {
    pub product_id: ProductId,
    pub size: String,
    pub reason: UnavailableReason,
}

/// Cart state returned by cart reads and mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub total: Money,
    pub new_total: Money,
    pub coupon_code: Option<String>,
    pub unavailable_items: Vec<UnavailableItem>,
}
