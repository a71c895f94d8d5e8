//! Availability checks over a whole cart.
//!
//! [`validate_cart`] is the inline check run on cart reads and before
//! checkout. [`release_expired`] is the narrower pass the background sweeper
//! runs. Both go through [`release_line`], so running either one twice, or
//! both, leaves the ledger in the same state.

use crate::cart::{release_line, Cart, ProductMap, UnavailableItem, UnavailableReason};
use crate::catalog::{AdjustmentReason, StockMovement};
use crate::error::CommerceError;
use crate::ids::ProductId;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Outcome of a pass over one cart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartCheck {
    /// Lines reported to the caller.
    pub unavailable: Vec<UnavailableItem>,
    /// Ledger movements applied while dropping lines.
    pub movements: Vec<StockMovement>,
    /// Products whose counters changed and must be written back.
    pub touched: BTreeSet<ProductId>,
}

impl CartCheck {
    /// True if the cart changed (lines dropped).
    pub fn cart_changed(&self) -> bool {
        self.unavailable
            .iter()
            .any(|u| u.reason != UnavailableReason::InsufficientStock)
    }

    fn report(&mut self, product_id: &ProductId, size: &str, reason: UnavailableReason) {
        self.unavailable.push(UnavailableItem {
            product_id: product_id.clone(),
            size: size.to_string(),
            reason,
        });
    }

    fn record(&mut self, movement: Option<StockMovement>) {
        if let Some(movement) = movement {
            self.touched.insert(movement.product_id.clone());
            self.movements.push(movement);
        }
    }
}

/// Check every line against the current catalog.
///
/// Dropped (and released where the variant still exists):
/// - product missing, archived or untracked: `ProductDeleted`
/// - size no longer offered: `SizeRemoved`
/// - reservation older than `ttl`: `Expired`
///
/// Reported but kept: stock fell below the line's quantity
/// (`InsufficientStock`).
pub fn validate_cart(
    cart: &mut Cart,
    products: &mut ProductMap,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<CartCheck, CommerceError> {
    let mut check = CartCheck::default();
    let lines: Vec<_> = cart
        .items
        .iter()
        .map(|i| {
            (
                i.id.clone(),
                i.product_id.clone(),
                i.size.clone(),
                i.quantity,
                i.is_expired(now, ttl),
            )
        })
        .collect();

    for (line_id, product_id, size, quantity, expired) in lines {
        let product = products.get_mut(&product_id);
        let reason = match product.as_deref() {
            None => Some(UnavailableReason::ProductDeleted),
            Some(p) if !p.is_available() || !p.stock_tracked => {
                Some(UnavailableReason::ProductDeleted)
            }
            Some(p) => match p.variant(&size) {
                None => Some(UnavailableReason::SizeRemoved),
                Some(_) if expired => Some(UnavailableReason::Expired),
                Some(v) if v.stock - (v.reserved - quantity) < quantity => {
                    Some(UnavailableReason::InsufficientStock)
                }
                Some(_) => None,
            },
        };

        let Some(reason) = reason else { continue };
        check.report(&product_id, &size, reason);
        if reason == UnavailableReason::InsufficientStock {
            continue;
        }
        let adjustment = if reason.is_expiry() {
            AdjustmentReason::Expired
        } else {
            AdjustmentReason::Released
        };
        let (_, movement) = release_line(cart, &line_id, product, adjustment, now)?;
        check.record(movement);
    }

    Ok(check)
}

/// Release and drop only the expired lines.
///
/// Carts without expired lines are left untouched.
pub fn release_expired(
    cart: &mut Cart,
    products: &mut ProductMap,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<CartCheck, CommerceError> {
    let mut check = CartCheck::default();
    for line_id in cart.expired_items(now, ttl) {
        let line = cart.item(&line_id)?;
        let product_id = line.product_id.clone();
        let size = line.size.clone();
        let product = products.get_mut(&product_id);
        let (_, movement) = release_line(cart, &line_id, product, AdjustmentReason::Expired, now)?;
        check.report(&product_id, &size, UnavailableReason::Expired);
        check.record(movement);
    }
    Ok(check)
}
