//! Turning a validated cart into an order.

use crate::cart::{Cart, ProductMap, UnavailableItem, UnavailableReason};
use crate::catalog::StockMovement;
use crate::checkout::{display_id, ItemStatus, Order, OrderItem, OrderStatus, PaymentMethod};
use crate::error::CommerceError;
use crate::ids::{AddressId, OrderId, OrderItemId};
use crate::money::Money;
use chrono::{DateTime, Utc};

/// Everything the commit produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub order: Order,
    pub movements: Vec<StockMovement>,
    /// Coupon code to add to the customer's used set.
    pub used_coupon: Option<String>,
}

/// Snapshot `cart` into an order, sell its reserved units and clear it.
///
/// The cart must already be validated and priced. `sequence` numbers the
/// order's display id. On error `products` may be partly updated and must be
/// discarded with the rest of the transaction.
pub fn commit_cart(
    cart: &mut Cart,
    products: &mut ProductMap,
    address_id: AddressId,
    payment: &PaymentMethod,
    sequence: u64,
    now: DateTime<Utc>,
) -> Result<Committed, CommerceError> {
    if cart.is_empty() {
        return Err(CommerceError::EmptyCart);
    }

    let mut items = Vec::with_capacity(cart.items.len());
    let mut movements = Vec::with_capacity(cart.items.len());
    for line in &cart.items {
        let Some(product) = products.get_mut(&line.product_id) else {
            return Err(CommerceError::CartUnavailable(vec![UnavailableItem {
                product_id: line.product_id.clone(),
                size: line.size.clone(),
                reason: UnavailableReason::ProductDeleted,
            }]));
        };
        movements.push(product.commit_sale(&line.size, line.quantity)?);
        product.touch(now);
        items.push(OrderItem {
            id: OrderItemId::generate(),
            product_id: line.product_id.clone(),
            name: product.name.clone(),
            size: line.size.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            status: ItemStatus::Active,
            cancel_reason: None,
        });
    }

    let used_coupon = cart.coupon.as_ref().map(|c| c.code.clone());
    let discount = cart
        .coupon
        .as_ref()
        .map(|c| c.discount)
        .unwrap_or_else(|| Money::zero(cart.currency));

    let order = Order {
        id: OrderId::generate(),
        display_id: display_id(sequence),
        user_id: cart.user_id.clone(),
        items,
        address_id,
        total_amount: cart.new_total,
        coupon_code: used_coupon.clone(),
        discount,
        payment_method: payment.kind(),
        payment_id: payment.payment_id().map(str::to_string),
        status: OrderStatus::Pending,
        cancel_reason: None,
        return_reason: None,
        refunded: Money::zero(cart.currency),
        created_at: now,
        updated_at: now,
    };
    cart.clear(now);

    Ok(Committed {
        order,
        movements,
        used_coupon,
    })
}
