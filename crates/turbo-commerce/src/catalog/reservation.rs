//! Reservation policy: may this quantity be held for a cart line?
//!
//! Pure decision logic over a product snapshot. Applying the approved
//! delta goes through the stock ledger operations in `inventory`.

use crate::catalog::Product;
use crate::error::CommerceError;
use crate::ids::ProductId;

/// What the caller wants to do with a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationIntent {
    /// Hold `quantity` more units (new line or merge into an existing one).
    Add { quantity: i64 },
    /// Set a line already holding `current` units to `target` units.
    SetQuantity { current: i64, target: i64 },
}

/// Outcome of a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Approval {
    /// Units approved by this request (added units, or the new line quantity).
    pub quantity: i64,
    /// Change to apply to the variant's `reserved` counter.
    pub reserved_delta: i64,
}

/// Decide whether `intent` can be honoured for `size` of `product`.
///
/// `product` is `None` when the catalog lookup found nothing.
pub fn approve(
    product_id: &ProductId,
    product: Option<&Product>,
    size: &str,
    intent: ReservationIntent,
) -> Result<Approval, CommerceError> {
    let product = product
        .filter(|p| p.stock_tracked && p.is_available())
        .ok_or_else(|| CommerceError::ProductNotFound(product_id.clone()))?;

    let variant = product
        .variant(size)
        .ok_or_else(|| CommerceError::VariantNotFound {
            product_id: product_id.clone(),
            size: size.to_string(),
        })?;

    match intent {
        ReservationIntent::Add { quantity } => {
            if quantity < 1 {
                return Err(CommerceError::InvalidQuantity(quantity));
            }
            let available = variant.available();
            check_available(product_id, size, quantity, available)?;
            Ok(Approval {
                quantity,
                reserved_delta: quantity,
            })
        }
        ReservationIntent::SetQuantity { current, target } => {
            if target < 1 {
                return Err(CommerceError::InvalidQuantity(target));
            }
            if target > current {
                // The line's own units count as headroom.
                let headroom = variant.stock - (variant.reserved - current);
                check_available(product_id, size, target, headroom)?;
            }
            Ok(Approval {
                quantity: target,
                reserved_delta: target - current,
            })
        }
    }
}

fn check_available(
    product_id: &ProductId,
    size: &str,
    requested: i64,
    available: i64,
) -> Result<(), CommerceError> {
    if available < 1 {
        return Err(CommerceError::OutOfStock {
            product_id: product_id.clone(),
            size: size.to_string(),
        });
    }
    if available < requested {
        return Err(CommerceError::InsufficientStock {
            product_id: product_id.clone(),
            size: size.to_string(),
            requested,
            available,
        });
    }
    Ok(())
}
