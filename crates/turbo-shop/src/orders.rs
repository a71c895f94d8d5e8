//! Order lifecycle.
//!
//! Every transition writes the order, the restocked products and the wallet
//! refund in one transaction.

use crate::error::ShopResult;
use crate::repo;
use crate::shop::Shared;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use turbo_commerce::catalog::AdjustmentReason;
use turbo_commerce::checkout::{Order, Reversal};
use turbo_commerce::wallet::WalletReason;
use turbo_commerce::{CommerceError, Money, OrderId, OrderItemId, UserId};

/// Order reads and lifecycle transitions.
#[derive(Debug, Clone)]
pub struct OrderService {
    shared: Arc<Shared>,
}

/// Where reversed stock and money are booked.
#[derive(Debug, Clone, Copy)]
struct Booking {
    stock: AdjustmentReason,
    wallet: WalletReason,
}

const CANCELLATION: Booking = Booking {
    stock: AdjustmentReason::Cancellation,
    wallet: WalletReason::Cancellation,
};

const RETURN: Booking = Booking {
    stock: AdjustmentReason::Return,
    wallet: WalletReason::Return,
};

fn nothing_to_reverse(order: &Order) -> Reversal {
    Reversal {
        restock: Vec::new(),
        refund: Money::zero(order.total_amount.currency),
    }
}

impl OrderService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// One of the user's orders.
    pub async fn get_order(&self, user_id: &UserId, order_id: &OrderId) -> ShopResult<Order> {
        let order = self
            .shared
            .db
            .get::<Order>(repo::ORDERS, order_id.as_str())
            .await?
            .map(|doc| doc.into_inner())
            .filter(|o| &o.user_id == user_id)
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?;
        Ok(order)
    }

    /// The user's orders, newest first.
    pub async fn orders_for(&self, user_id: &UserId) -> ShopResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .shared
            .db
            .scan::<Order>(repo::ORDERS)
            .await?
            .into_iter()
            .map(|(_, doc)| doc.into_inner())
            .filter(|o| &o.user_id == user_id)
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.display_id.cmp(&a.display_id))
        });
        Ok(orders)
    }

    /// Cancel the whole order: restock every active item and refund prepaid
    /// amounts to the wallet.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
        reason: &str,
    ) -> ShopResult<Order> {
        let order = self
            .transition("cancel_order", Some(user_id), order_id, CANCELLATION, |order, now| {
                order.cancel(reason, now)
            })
            .await?;
        tracing::info!(%user_id, order = %order.display_id, reason, "Order cancelled");
        Ok(order)
    }

    /// Cancel one item. Its share of the paid total is refunded for prepaid
    /// orders; cancelling the last active item cancels the order.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, order_id = %order_id))]
    pub async fn cancel_item(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
        item_id: &OrderItemId,
        reason: &str,
    ) -> ShopResult<Order> {
        let order = self
            .transition("cancel_item", Some(user_id), order_id, CANCELLATION, |order, now| {
                order.cancel_item(item_id, reason, now)
            })
            .await?;
        tracing::info!(
            %user_id,
            order = %order.display_id,
            %item_id,
            status = order.status.as_str(),
            "Order item cancelled"
        );
        Ok(order)
    }

    /// Ask to return a delivered order.
    pub async fn request_return(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
        reason: &str,
    ) -> ShopResult<Order> {
        self.transition("request_return", Some(user_id), order_id, RETURN, |order, now| {
            order.request_return(reason, now)?;
            Ok(nothing_to_reverse(order))
        })
        .await
    }

    /// Accept or reject a requested return. Accepting restocks the items and
    /// credits the paid total to the wallet.
    pub async fn resolve_return(&self, order_id: &OrderId, accept: bool) -> ShopResult<Order> {
        let order = self
            .transition("resolve_return", None, order_id, RETURN, |order, now| {
                order.resolve_return(accept, now)
            })
            .await?;
        tracing::info!(order = %order.display_id, accept, "Return resolved");
        Ok(order)
    }

    /// Move the order one step along the fulfilment path.
    pub async fn advance_status(&self, order_id: &OrderId) -> ShopResult<Order> {
        self.transition("advance_status", None, order_id, CANCELLATION, |order, now| {
            order.advance_status(now)?;
            Ok(nothing_to_reverse(order))
        })
        .await
    }

    async fn transition<F>(
        &self,
        operation: &'static str,
        owner: Option<&UserId>,
        order_id: &OrderId,
        booking: Booking,
        apply: F,
    ) -> ShopResult<Order>
    where
        F: Fn(&mut Order, DateTime<Utc>) -> Result<Reversal, CommerceError>,
    {
        self.shared
            .retry
            .run(operation, || self.transition_once(owner, order_id, booking, &apply))
            .await
    }

    async fn transition_once<F>(
        &self,
        owner: Option<&UserId>,
        order_id: &OrderId,
        booking: Booking,
        apply: &F,
    ) -> ShopResult<Order>
    where
        F: Fn(&mut Order, DateTime<Utc>) -> Result<Reversal, CommerceError>,
    {
        let shared = &self.shared;
        let now = shared.clock.now();
        let mut tx = shared.db.begin();
        let mut order = repo::load_order(&mut tx, order_id)
            .await?
            .filter(|o| owner.map_or(true, |u| &o.user_id == u))
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?;

        let reversal = apply(&mut order, now)?;

        let before =
            repo::load_products(&mut tx, reversal.restock.iter().map(|r| &r.product_id)).await?;
        let mut products = before.clone();
        for restock in &reversal.restock {
            let Some(product) = products.get_mut(&restock.product_id) else {
                tracing::warn!(
                    order = %order.display_id,
                    product_id = %restock.product_id,
                    "Product gone, skipping restock"
                );
                continue;
            };
            if product.variant(&restock.size).is_none() {
                tracing::warn!(
                    order = %order.display_id,
                    product_id = %restock.product_id,
                    size = %restock.size,
                    "Size gone, skipping restock"
                );
                continue;
            }
            product.restock(&restock.size, restock.quantity, booking.stock)?;
            product.touch(now);
        }
        repo::stage_changed_products(&mut tx, &before, &products)?;

        if reversal.refund.is_positive() {
            let mut wallet =
                repo::load_wallet(&mut tx, &order.user_id, reversal.refund.currency).await?;
            wallet.credit(reversal.refund, booking.wallet, &order.display_id, now)?;
            tx.put(repo::WALLETS, order.user_id.as_str(), &wallet)?;
        }

        tx.put(repo::ORDERS, order.id.as_str(), &order)?;
        tx.commit().await?;
        Ok(order)
    }
}
