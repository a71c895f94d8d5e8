//! Stock ledger operations.
//!
//! Each operation mutates one variant's counters and returns the
//! [`StockMovement`] it applied. Persisting the product (and bumping its
//! version) is the store's job.

use crate::catalog::Product;
use crate::error::CommerceError;
use crate::ids::ProductId;
use serde::{Deserialize, Serialize};

/// Stock counters for one size of a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variant {
    /// Size label (e.g., "M").
    pub size: String,
    /// Units physically in stock.
    pub stock: i64,
    /// Units held by cart reservations.
    #[serde(default)]
    pub reserved: i64,
}

impl Variant {
    /// Create a variant with nothing reserved.
    pub fn new(size: impl Into<String>, stock: i64) -> Self {
        Self {
            size: size.into(),
            stock,
            reserved: 0,
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }

    /// Check if out of stock.
    pub fn is_out_of_stock(&self) -> bool {
        self.available() <= 0
    }

    /// `0 <= reserved <= stock`.
    pub fn is_consistent(&self) -> bool {
        self.reserved >= 0 && self.reserved <= self.stock
    }
}

/// Reason for a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Held for a cart line.
    Reserved,
    /// Cart line removed or shrunk.
    Released,
    /// Cart line expired.
    Expired,
    /// Sold at checkout.
    Sale,
    /// Returned to stock by cancellation.
    Cancellation,
    /// Returned to stock by an accepted return.
    Return,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Reserved => "reserved",
            AdjustmentReason::Released => "released",
            AdjustmentReason::Expired => "expired",
            AdjustmentReason::Sale => "sale",
            AdjustmentReason::Cancellation => "cancellation",
            AdjustmentReason::Return => "return",
        }
    }
}

/// A change applied to one variant's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub size: String,
    pub stock_delta: i64,
    pub reserved_delta: i64,
    pub reason: AdjustmentReason,
}

impl StockMovement {
    /// True when nothing changed (e.g., releasing an already-released line).
    pub fn is_noop(&self) -> bool {
        self.stock_delta == 0 && self.reserved_delta == 0
    }
}

impl Product {
    /// Hold `quantity` units of `size`.
    pub fn reserve(&mut self, size: &str, quantity: i64) -> Result<StockMovement, CommerceError> {
        if quantity <= 0 {
            return Err(CommerceError::InvalidQuantity(quantity));
        }
        let product_id = self.id.clone();
        let variant = self.variant_mut(size)?;
        let available = variant.available();
        if available < quantity {
            return Err(CommerceError::InsufficientStock {
                product_id,
                size: size.to_string(),
                requested: quantity,
                available: available.max(0),
            });
        }
        variant.reserved += quantity;
        Ok(self.movement(size, 0, quantity, AdjustmentReason::Reserved))
    }

    /// Give back up to `quantity` reserved units of `size`.
    ///
    /// Never drives `reserved` below zero, so releasing twice is harmless.
    pub fn release(
        &mut self,
        size: &str,
        quantity: i64,
        reason: AdjustmentReason,
    ) -> Result<StockMovement, CommerceError> {
        let variant = self.variant_mut(size)?;
        let released = quantity.clamp(0, variant.reserved.max(0));
        variant.reserved -= released;
        Ok(self.movement(size, 0, -released, reason))
    }

    /// Turn `quantity` reserved units into a sale.
    pub fn commit_sale(
        &mut self,
        size: &str,
        quantity: i64,
    ) -> Result<StockMovement, CommerceError> {
        let product_id = self.id.clone();
        let variant = self.variant_mut(size)?;
        if variant.reserved < quantity || variant.stock < quantity {
            return Err(CommerceError::InsufficientStock {
                product_id,
                size: size.to_string(),
                requested: quantity,
                available: variant.reserved.min(variant.stock).max(0),
            });
        }
        variant.reserved -= quantity;
        variant.stock -= quantity;
        Ok(self.movement(size, -quantity, -quantity, AdjustmentReason::Sale))
    }

    /// Put `quantity` sold units back on the shelf.
    pub fn restock(
        &mut self,
        size: &str,
        quantity: i64,
        reason: AdjustmentReason,
    ) -> Result<StockMovement, CommerceError> {
        if quantity <= 0 {
            return Err(CommerceError::InvalidQuantity(quantity));
        }
        let variant = self.variant_mut(size)?;
        variant.stock += quantity;
        Ok(self.movement(size, quantity, 0, reason))
    }

    fn movement(
        &self,
        size: &str,
        stock_delta: i64,
        reserved_delta: i64,
        reason: AdjustmentReason,
    ) -> StockMovement {
        StockMovement {
            product_id: self.id.clone(),
            size: size.to_string(),
            stock_delta,
            reserved_delta,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};

    fn product(stock: i64) -> Product {
        Product::new(ProductId::new("tee"), "Tee", Money::from_major(500, Currency::INR))
            .with_variant("M", stock)
    }

    #[test]
    fn test_reserve_release() {
        let mut p = product(10);

        p.reserve("M", 3).unwrap();
        assert_eq!(p.variant("M").unwrap().reserved, 3);
        assert_eq!(p.variant("M").unwrap().available(), 7);

        p.release("M", 2, AdjustmentReason::Released).unwrap();
        assert_eq!(p.variant("M").unwrap().reserved, 1);
    }

    #[test]
    fn test_reserve_beyond_available_fails_without_mutation() {
        let mut p = product(5);
        p.reserve("M", 3).unwrap();

        let err = p.reserve("M", 3).unwrap_err();
        assert_eq!(
            err,
            CommerceError::InsufficientStock {
                product_id: ProductId::new("tee"),
                size: "M".into(),
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(p.variant("M").unwrap().reserved, 3);
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut p = product(5);
        p.reserve("M", 2).unwrap();
        p.release("M", 2, AdjustmentReason::Expired).unwrap();

        let second = p.release("M", 2, AdjustmentReason::Expired).unwrap();
        assert!(second.is_noop());
        assert_eq!(p.variant("M").unwrap().reserved, 0);
    }

    #[test]
    fn test_commit_sale() {
        let mut p = product(10);
        p.reserve("M", 3).unwrap();
        let movement = p.commit_sale("M", 3).unwrap();

        assert_eq!(movement.stock_delta, -3);
        assert_eq!(p.variant("M").unwrap().stock, 7);
        assert_eq!(p.variant("M").unwrap().reserved, 0);
    }

    #[test]
    fn test_commit_sale_requires_reservation() {
        let mut p = product(10);
        assert!(p.commit_sale("M", 1).is_err());
    }

    #[test]
    fn test_restock() {
        let mut p = product(1);
        p.restock("M", 2, AdjustmentReason::Cancellation).unwrap();
        assert_eq!(p.variant("M").unwrap().stock, 3);
        assert!(p.variant("M").unwrap().is_consistent());
    }
}
