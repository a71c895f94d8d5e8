//! Cart pricing calculations.

use crate::cart::{Cart, CartItem};
use crate::catalog::{OfferBook, Product};
use crate::error::CommerceError;
use crate::ids::{LineItemId, ProductId};
use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Products referenced by a cart, keyed by id.
pub type ProductMap = BTreeMap<ProductId, Product>;

/// Result of pricing a set of cart lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedLines {
    /// Sum of `unit price * quantity` over resolved lines.
    pub total: Money,
    /// Current unit price per resolved line.
    pub unit_prices: Vec<(LineItemId, Money)>,
    /// Lines whose product could not be resolved (skipped).
    pub unresolved: Vec<LineItemId>,
}

/// Price `items` against current offers.
///
/// Lines whose product is missing from `products` are skipped and listed in
/// `unresolved`.
pub fn compute_total(
    items: &[CartItem],
    products: &ProductMap,
    offers: &OfferBook,
    currency: Currency,
    now: DateTime<Utc>,
) -> Result<PricedLines, CommerceError> {
    let mut total = Money::zero(currency);
    let mut unit_prices = Vec::with_capacity(items.len());
    let mut unresolved = Vec::new();

    for item in items {
        let Some(product) = products.get(&item.product_id) else {
            unresolved.push(item.id.clone());
            continue;
        };
        let (unit_price, _) = offers.unit_price(product, now);
        if unit_price.currency != currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: currency.code().to_string(),
                got: unit_price.currency.code().to_string(),
            });
        }
        let line = unit_price
            .checked_mul(item.quantity)
            .ok_or(CommerceError::Overflow)?;
        total = total.checked_add(&line).ok_or(CommerceError::Overflow)?;
        unit_prices.push((item.id.clone(), unit_price));
    }

    Ok(PricedLines {
        total,
        unit_prices,
        unresolved,
    })
}

/// Recompute the cart's totals and refresh each line's price snapshot.
pub fn reprice(
    cart: &mut Cart,
    products: &ProductMap,
    offers: &OfferBook,
    now: DateTime<Utc>,
) -> Result<PricedLines, CommerceError> {
    let priced = compute_total(&cart.items, products, offers, cart.currency, now)?;
    for (id, price) in &priced.unit_prices {
        if let Ok(item) = cart.item_mut(id) {
            item.unit_price = *price;
        }
    }
    cart.set_total(priced.total);
    Ok(priced)
}
