//! Cart mutations that move stock.
//!
//! Each function changes the cart and the product's stock ledger together,
//! in memory. Callers load both documents, call one of these, and write both
//! back in a single store transaction. On error neither side has changed.

use crate::cart::{Cart, CartItem};
use crate::catalog::{approve, AdjustmentReason, Product, ReservationIntent, StockMovement};
use crate::error::CommerceError;
use crate::ids::{LineItemId, ProductId};
use chrono::{DateTime, Utc};

/// What a mutation did.
#[derive(Debug, Clone, PartialEq)]
pub struct LineChange {
    /// The line created or changed.
    pub line_id: LineItemId,
    /// Ledger movements applied to the product.
    pub movements: Vec<StockMovement>,
}

fn check_limit(quantity: i64, limit: i64) -> Result<(), CommerceError> {
    if quantity < 1 {
        return Err(CommerceError::InvalidQuantity(quantity));
    }
    if quantity > limit {
        return Err(CommerceError::QuantityExceedsLimit(quantity, limit));
    }
    Ok(())
}

/// Add `quantity` of `size`, merging into an existing `(product, size)` line.
pub fn add_item(
    cart: &mut Cart,
    product_id: &ProductId,
    product: Option<&mut Product>,
    size: &str,
    quantity: i64,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<LineChange, CommerceError> {
    check_limit(quantity, limit)?;
    let existing = cart.find_line(product_id, size).map(|l| l.quantity);
    if let Some(current) = existing {
        let merged = current.checked_add(quantity).ok_or(CommerceError::Overflow)?;
        check_limit(merged, limit)?;
    }

    approve(
        product_id,
        product.as_deref(),
        size,
        ReservationIntent::Add { quantity },
    )?;
    let product = product.ok_or_else(|| CommerceError::ProductNotFound(product_id.clone()))?;
    let movement = product.reserve(size, quantity)?;
    product.touch(now);

    let line_id = match cart
        .items
        .iter_mut()
        .find(|i| &i.product_id == product_id && i.size == size)
    {
        Some(line) => {
            line.quantity += quantity;
            line.unit_price = product.price;
            line.touch(now);
            line.id.clone()
        }
        None => {
            let line = CartItem::new(product_id.clone(), size, quantity, product.price, now);
            let id = line.id.clone();
            cart.items.push(line);
            id
        }
    };
    cart.updated_at = now;

    Ok(LineChange {
        line_id,
        movements: vec![movement],
    })
}

/// Change a line's quantity by `delta` units.
pub fn change_quantity(
    cart: &mut Cart,
    line_id: &LineItemId,
    product: Option<&mut Product>,
    delta: i64,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<LineChange, CommerceError> {
    let line = cart.item(line_id)?;
    let current = line.quantity;
    let product_id = line.product_id.clone();
    let size = line.size.clone();
    let target = current.checked_add(delta).ok_or(CommerceError::Overflow)?;
    check_limit(target, limit)?;

    let approval = approve(
        &product_id,
        product.as_deref(),
        &size,
        ReservationIntent::SetQuantity { current, target },
    )?;
    let product = product.ok_or(CommerceError::ProductNotFound(product_id))?;

    let mut movements = Vec::new();
    if approval.reserved_delta > 0 {
        movements.push(product.reserve(&size, approval.reserved_delta)?);
    } else if approval.reserved_delta < 0 {
        movements.push(product.release(
            &size,
            -approval.reserved_delta,
            AdjustmentReason::Released,
        )?);
    }
    product.touch(now);

    let line = cart.item_mut(line_id)?;
    line.quantity = approval.quantity;
    line.unit_price = product.price;
    line.touch(now);
    cart.updated_at = now;

    Ok(LineChange {
        line_id: line_id.clone(),
        movements,
    })
}

/// Move a line to another size of the same product.
///
/// Releases the old size and reserves the new one as one step: if the new
/// size can't take the quantity, nothing changes.
pub fn change_size(
    cart: &mut Cart,
    line_id: &LineItemId,
    product: Option<&mut Product>,
    new_size: &str,
    now: DateTime<Utc>,
) -> Result<LineChange, CommerceError> {
    let line = cart.item(line_id)?;
    if line.size == new_size {
        return Ok(LineChange {
            line_id: line_id.clone(),
            movements: Vec::new(),
        });
    }
    let product_id = line.product_id.clone();
    let old_size = line.size.clone();
    let quantity = line.quantity;
    if cart.find_line(&product_id, new_size).is_some() {
        return Err(CommerceError::Validation(format!(
            "{product_id} (size {new_size}) is already in the cart"
        )));
    }

    approve(
        &product_id,
        product.as_deref(),
        new_size,
        ReservationIntent::Add { quantity },
    )?;
    let product = product.ok_or(CommerceError::ProductNotFound(product_id))?;

    let mut staged = product.clone();
    let released = staged.release(&old_size, quantity, AdjustmentReason::Released)?;
    let reserved = staged.reserve(new_size, quantity)?;
    staged.touch(now);
    *product = staged;

    let line = cart.item_mut(line_id)?;
    line.size = new_size.to_string();
    line.unit_price = product.price;
    line.touch(now);
    cart.updated_at = now;

    Ok(LineChange {
        line_id: line_id.clone(),
        movements: vec![released, reserved],
    })
}

/// Remove a line and give its units back.
///
/// `product` is None when the product no longer exists; the line is still
/// removed.
pub fn release_line(
    cart: &mut Cart,
    line_id: &LineItemId,
    product: Option<&mut Product>,
    reason: AdjustmentReason,
    now: DateTime<Utc>,
) -> Result<(CartItem, Option<StockMovement>), CommerceError> {
    let line = cart.take_line(line_id)?;
    let movement = match product {
        Some(product) if product.variant(&line.size).is_some() => {
            let movement = product.release(&line.size, line.quantity, reason)?;
            product.touch(now);
            Some(movement)
        }
        _ => None,
    };
    cart.updated_at = now;
    Ok((line, movement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::money::{Currency, Money};

    fn tee(m: i64, l: i64) -> Product {
        Product::new(ProductId::new("tee"), "Tee", Money::from_major(500, Currency::INR))
            .with_variant("M", m)
            .with_variant("L", l)
    }

    fn cart() -> Cart {
        Cart::new(UserId::new("u1"), Currency::INR, Utc::now())
    }

    fn id() -> ProductId {
        ProductId::new("tee")
    }

    #[test]
    fn test_add_then_merge() {
        let now = Utc::now();
        let mut cart = cart();
        let mut product = tee(5, 5);

        let first = add_item(&mut cart, &id(), Some(&mut product), "M", 3, 10, now).unwrap();
        assert_eq!(product.variant("M").unwrap().reserved, 3);
        assert_eq!(product.variant("M").unwrap().available(), 2);

        let err = add_item(&mut cart, &id(), Some(&mut product), "M", 3, 10, now).unwrap_err();
        assert_eq!(err.to_string(), "Only 2 items available for tee (size M)");
        assert_eq!(product.variant("M").unwrap().reserved, 3);
        assert_eq!(cart.items[0].quantity, 3);

        let second = add_item(&mut cart, &id(), Some(&mut product), "M", 2, 10, now).unwrap();
        assert_eq!(first.line_id, second.line_id);
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(product.variant("M").unwrap().reserved, 5);
    }

    #[test]
    fn test_add_respects_line_limit() {
        let mut cart = cart();
        let mut product = tee(50, 0);
        let err = add_item(&mut cart, &id(), Some(&mut product), "M", 11, 10, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CommerceError::QuantityExceedsLimit(11, 10)));
        assert_eq!(product.reserved(), 0);
    }

    #[test]
    fn test_add_missing_product_leaves_cart_alone() {
        let mut cart = cart();
        let err = add_item(&mut cart, &id(), None, "M", 1, 10, Utc::now()).unwrap_err();
        assert!(matches!(err, CommerceError::ProductNotFound(_)));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_change_quantity_up_and_down() {
        let now = Utc::now();
        let mut cart = cart();
        let mut product = tee(5, 0);
        let line = add_item(&mut cart, &id(), Some(&mut product), "M", 3, 10, now)
            .unwrap()
            .line_id;

        change_quantity(&mut cart, &line, Some(&mut product), 2, 10, now).unwrap();
        assert_eq!(product.variant("M").unwrap().reserved, 5);

        let err = change_quantity(&mut cart, &line, Some(&mut product), 1, 10, now).unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientStock { available: 5, .. }));

        change_quantity(&mut cart, &line, Some(&mut product), -4, 10, now).unwrap();
        assert_eq!(cart.items[0].quantity, 1);
        assert_eq!(product.variant("M").unwrap().reserved, 1);

        let err = change_quantity(&mut cart, &line, Some(&mut product), -1, 10, now).unwrap_err();
        assert!(matches!(err, CommerceError::InvalidQuantity(0)));
    }

    #[test]
    fn test_change_size_is_all_or_nothing() {
        let now = Utc::now();
        let mut cart = cart();
        let mut product = tee(5, 1);
        let line = add_item(&mut cart, &id(), Some(&mut product), "M", 2, 10, now)
            .unwrap()
            .line_id;

        let err = change_size(&mut cart, &line, Some(&mut product), "L", now).unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientStock { available: 1, .. }));
        assert_eq!(product.variant("M").unwrap().reserved, 2);
        assert_eq!(product.variant("L").unwrap().reserved, 0);
        assert_eq!(cart.items[0].size, "M");

        product.variant_mut("L").unwrap().stock = 4;
        let change = change_size(&mut cart, &line, Some(&mut product), "L", now).unwrap();
        assert_eq!(change.movements.len(), 2);
        assert_eq!(product.variant("M").unwrap().reserved, 0);
        assert_eq!(product.variant("L").unwrap().reserved, 2);
        assert_eq!(cart.items[0].size, "L");
    }

    #[test]
    fn test_add_remove_round_trip() {
        let now = Utc::now();
        let mut cart = cart();
        let mut product = tee(5, 0);
        product.reserve("M", 1).unwrap();
        let before = product.variant("M").unwrap().reserved;

        let line = add_item(&mut cart, &id(), Some(&mut product), "M", 3, 10, now)
            .unwrap()
            .line_id;
        let (removed, movement) =
            release_line(&mut cart, &line, Some(&mut product), AdjustmentReason::Released, now)
                .unwrap();

        assert_eq!(removed.quantity, 3);
        assert_eq!(movement.unwrap().reserved_delta, -3);
        assert_eq!(product.variant("M").unwrap().reserved, before);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_release_line_without_product() {
        let now = Utc::now();
        let mut cart = cart();
        cart.items.push(CartItem::new(
            id(),
            "M",
            1,
            Money::from_major(1, Currency::INR),
            now,
        ));
        let line = cart.items[0].id.clone();
        let (_, movement) =
            release_line(&mut cart, &line, None, AdjustmentReason::Released, now).unwrap();
        assert!(movement.is_none());
        assert!(cart.is_empty());
    }
}
