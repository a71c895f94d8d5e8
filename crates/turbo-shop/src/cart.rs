//! Cart operations.
//!
//! Each mutation runs as one store transaction covering the cart and the
//! products it touches, so the cart line and the variant's `reserved` counter
//! always change together. A lost version race re-runs the whole operation.

use crate::error::{ShopError, ShopResult};
use crate::repo;
use crate::shop::Shared;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turbo_cache::cache_key;
use turbo_commerce::cart::{self as domain, Cart, CartSummary, ProductMap};
use turbo_commerce::catalog::{AdjustmentReason, OfferBook, StockMovement};
use turbo_commerce::{CommerceError, LineItemId, ProductId, UserId};
use turbo_db::Transaction;

/// Cart state after an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub summary: CartSummary,
    /// Set when an applied coupon stopped qualifying and was removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// The variant a cart mutation fights over, for reporting lost races.
#[derive(Debug, Clone, Copy)]
enum Contested<'a> {
    Variant {
        product_id: &'a ProductId,
        size: &'a str,
    },
    /// An existing line, optionally moving to another size.
    Line {
        line_id: &'a LineItemId,
        size: Option<&'a str>,
    },
}

/// Cart reads and mutations.
#[derive(Debug, Clone)]
pub struct CartService {
    shared: Arc<Shared>,
}

pub(crate) fn mirror_key(user_id: &UserId) -> String {
    cache_key!("cart", user_id)
}

/// Reprice `cart` and re-check its coupon. Returns the notice for a dropped
/// coupon.
pub(crate) async fn settle_totals(
    tx: &mut Transaction,
    cart: &mut Cart,
    products: &ProductMap,
    offers: &OfferBook,
    now: DateTime<Utc>,
) -> ShopResult<Option<String>> {
    let priced = domain::reprice(cart, products, offers, now)?;
    for line_id in &priced.unresolved {
        tracing::warn!(user_id = %cart.user_id, %line_id, "Skipped cart line with unknown product");
    }
    let Some(applied) = cart.coupon.clone() else {
        return Ok(None);
    };
    let coupon = repo::load_coupon(tx, &applied.code).await?;
    let dropped = domain::refresh_coupon(cart, coupon.as_ref(), now);
    if let Some(err) = &dropped {
        tracing::info!(
            user_id = %cart.user_id,
            code = %applied.code,
            error = %err,
            "Coupon no longer applies, removed"
        );
    }
    Ok(dropped.map(|e| e.to_string()))
}

/// Validate and reprice the stored cart, committing any releases.
pub(crate) async fn refresh_cart(shared: &Shared, user_id: &UserId) -> ShopResult<CartView> {
    shared
        .retry
        .run("refresh_cart", || refresh_cart_once(shared, user_id))
        .await
}

async fn refresh_cart_once(shared: &Shared, user_id: &UserId) -> ShopResult<CartView> {
    let now = shared.clock.now();
    let offers = repo::load_offers(&shared.db).await?;
    let mut tx = shared.db.begin();
    let Some(mut cart) = tx.get::<Cart>(repo::CARTS, user_id.as_str()).await? else {
        let cart = Cart::new(user_id.clone(), shared.config.checkout.currency, now);
        return Ok(CartView {
            summary: cart.summary(Vec::new()),
            notice: None,
        });
    };
    let original = cart.clone();
    let before = repo::load_cart_products(&mut tx, &cart, None).await?;
    let mut products = before.clone();

    let check =
        domain::validate_cart(&mut cart, &mut products, now, shared.config.reservation_ttl())?;
    let notice = settle_totals(&mut tx, &mut cart, &products, &offers, now).await?;

    if cart != original {
        cart.updated_at = now;
        repo::stage_cart(&mut tx, &cart)?;
        repo::stage_changed_products(&mut tx, &before, &products)?;
        tx.commit().await?;
        log_movements(user_id, &check.movements);
    }
    if check.cart_changed() {
        let dropped = original.items.len() - cart.items.len();
        tracing::info!(%user_id, dropped, "Dropped unavailable cart lines");
        shared.cache.delete(&mirror_key(user_id));
    }

    Ok(CartView {
        summary: cart.summary(check.unavailable),
        notice,
    })
}

impl CartService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn limit(&self) -> i64 {
        self.shared.config.checkout.max_quantity_per_line
    }

    /// Add `quantity` units of `product_id` in `size`, merging with an
    /// existing line for the same size.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        size: &str,
        quantity: i64,
    ) -> ShopResult<CartView> {
        let limit = self.limit();
        let contested = Contested::Variant { product_id, size };
        let view = self
            .mutate("add_item", user_id, contested, |cart, products, now| {
                let change = domain::add_item(
                    cart,
                    product_id,
                    products.get_mut(product_id),
                    size,
                    quantity,
                    limit,
                    now,
                )?;
                Ok(change.movements)
            })
            .await?;
        tracing::info!(%user_id, %product_id, size, quantity, "Item added to cart");
        Ok(view)
    }

    /// Change a line's quantity by `delta` (positive or negative).
    pub async fn change_quantity(
        &self,
        user_id: &UserId,
        line_id: &LineItemId,
        delta: i64,
    ) -> ShopResult<CartView> {
        let limit = self.limit();
        let contested = Contested::Line {
            line_id,
            size: None,
        };
        self.mutate("change_quantity", user_id, contested, |cart, products, now| {
            let product_id = cart.item(line_id)?.product_id.clone();
            let change = domain::change_quantity(
                cart,
                line_id,
                products.get_mut(&product_id),
                delta,
                limit,
                now,
            )?;
            Ok(change.movements)
        })
        .await
    }

    /// Move a line to another size of the same product.
    pub async fn change_size(
        &self,
        user_id: &UserId,
        line_id: &LineItemId,
        new_size: &str,
    ) -> ShopResult<CartView> {
        let contested = Contested::Line {
            line_id,
            size: Some(new_size),
        };
        self.mutate("change_size", user_id, contested, |cart, products, now| {
            let product_id = cart.item(line_id)?.product_id.clone();
            let product = products.get_mut(&product_id);
            let change = domain::change_size(cart, line_id, product, new_size, now)?;
            Ok(change.movements)
        })
        .await
    }

    /// Drop a line and release its units.
    pub async fn remove_item(
        &self,
        user_id: &UserId,
        line_id: &LineItemId,
    ) -> ShopResult<CartView> {
        let contested = Contested::Line {
            line_id,
            size: None,
        };
        self.mutate("remove_item", user_id, contested, |cart, products, now| {
            let product_id = cart.item(line_id)?.product_id.clone();
            let (_, movement) = domain::release_line(
                cart,
                line_id,
                products.get_mut(&product_id),
                AdjustmentReason::Released,
                now,
            )?;
            Ok(movement.into_iter().collect())
        })
        .await
    }

    /// Read the cart, dropping lines whose reservation expired or whose
    /// product or size is gone.
    ///
    /// Releases happen as part of the read and are committed before it
    /// returns. Lines with too little stock stay in the cart and are
    /// reported.
    pub async fn view_cart(&self, user_id: &UserId) -> ShopResult<CartView> {
        let view = refresh_cart(&self.shared, user_id).await?;
        let ttl = self.shared.config.summary_ttl();
        if let Err(err) = self
            .shared
            .cache
            .set_with_ttl(&mirror_key(user_id), &view.summary, ttl)
        {
            tracing::warn!(%user_id, error = %err, "Failed to mirror cart summary");
        }
        Ok(view)
    }

    /// Apply a coupon code to the cart.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn apply_coupon(&self, user_id: &UserId, code: &str) -> ShopResult<CartView> {
        let view = self
            .shared
            .retry
            .run("apply_coupon", || self.apply_coupon_once(user_id, code))
            .await?;
        self.shared.cache.delete(&mirror_key(user_id));
        tracing::info!(%user_id, code = %domain::Coupon::normalize(code), "Coupon applied");
        Ok(view)
    }

    async fn apply_coupon_once(&self, user_id: &UserId, code: &str) -> ShopResult<CartView> {
        let shared = &self.shared;
        let now = shared.clock.now();
        let offers = repo::load_offers(&shared.db).await?;
        let mut tx = shared.db.begin();
        let mut cart =
            repo::load_cart(&mut tx, user_id, shared.config.checkout.currency, now).await?;
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart.into());
        }
        let products = repo::load_cart_products(&mut tx, &cart, None).await?;

        domain::remove_coupon(&mut cart);
        domain::reprice(&mut cart, &products, &offers, now)?;
        let coupon = repo::load_coupon(&mut tx, code)
            .await?
            .ok_or_else(|| CommerceError::CouponInvalid(domain::Coupon::normalize(code)))?;
        let customer = repo::load_customer(&mut tx, user_id).await?;
        domain::apply_coupon(&mut cart, &coupon, customer.has_used(code), now)?;

        cart.updated_at = now;
        repo::stage_cart(&mut tx, &cart)?;
        tx.commit().await?;
        Ok(CartView {
            summary: cart.summary(Vec::new()),
            notice: None,
        })
    }

    /// Remove the applied coupon, if any.
    pub async fn remove_coupon(&self, user_id: &UserId) -> ShopResult<CartView> {
        let view = self
            .shared
            .retry
            .run("remove_coupon", || async {
                let now = self.shared.clock.now();
                let mut tx = self.shared.db.begin();
                let mut cart = repo::load_cart(
                    &mut tx,
                    user_id,
                    self.shared.config.checkout.currency,
                    now,
                )
                .await?;
                if domain::remove_coupon(&mut cart).is_some() {
                    cart.updated_at = now;
                    repo::stage_cart(&mut tx, &cart)?;
                    tx.commit().await?;
                }
                Ok(CartView {
                    summary: cart.summary(Vec::new()),
                    notice: None,
                })
            })
            .await?;
        self.shared.cache.delete(&mirror_key(user_id));
        Ok(view)
    }

    /// Last summary mirrored by [`CartService::view_cart`], if still fresh.
    ///
    /// Never validated against stock; use `view_cart` for anything that
    /// decides on availability.
    pub fn mirrored_summary(&self, user_id: &UserId) -> ShopResult<Option<CartSummary>> {
        Ok(self.shared.cache.get(&mirror_key(user_id))?)
    }

    /// Run `apply` against the cart and its products, retrying lost races.
    ///
    /// Running out of retries is reported as `StockConflict` for the
    /// contested variant, with availability read after the last attempt.
    async fn mutate<F>(
        &self,
        operation: &'static str,
        user_id: &UserId,
        contested: Contested<'_>,
        apply: F,
    ) -> ShopResult<CartView>
    where
        F: Fn(&mut Cart, &mut ProductMap, DateTime<Utc>) -> MutationResult,
    {
        let extra = match contested {
            Contested::Variant { product_id, .. } => Some(product_id),
            Contested::Line { .. } => None,
        };
        let outcome = self
            .shared
            .retry
            .run(operation, || self.mutate_once(user_id, extra, &apply))
            .await;
        let view = match outcome {
            Err(err @ ShopError::Contended { .. }) => {
                return Err(self.stock_conflict(user_id, contested, err).await);
            }
            other => other?,
        };
        self.shared.cache.delete(&mirror_key(user_id));
        Ok(view)
    }

    /// Turn an exhausted retry into `StockConflict` for the contested
    /// variant. Keeps `contended` when the variant can no longer be named.
    async fn stock_conflict(
        &self,
        user_id: &UserId,
        contested: Contested<'_>,
        contended: ShopError,
    ) -> ShopError {
        let db = &self.shared.db;
        let (product_id, size) = match contested {
            Contested::Variant { product_id, size } => (product_id.clone(), size.to_string()),
            Contested::Line { line_id, size } => {
                let cart = match db.get::<Cart>(repo::CARTS, user_id.as_str()).await {
                    Ok(Some(doc)) => doc.into_inner(),
                    _ => return contended,
                };
                let Ok(item) = cart.item(line_id) else {
                    return contended;
                };
                let size = size.unwrap_or(item.size.as_str()).to_string();
                (item.product_id.clone(), size)
            }
        };
        let available = match repo::catalog::get_product(db, &product_id).await {
            Ok(product) => product
                .and_then(|p| p.variant(&size).map(|v| v.available()))
                .unwrap_or(0),
            Err(_) => return contended,
        };
        tracing::warn!(%user_id, %product_id, size, available, "Gave up on contended variant");
        CommerceError::StockConflict {
            product_id,
            size,
            available,
        }
        .into()
    }

    async fn mutate_once<F>(
        &self,
        user_id: &UserId,
        extra: Option<&ProductId>,
        apply: &F,
    ) -> ShopResult<CartView>
    where
        F: Fn(&mut Cart, &mut ProductMap, DateTime<Utc>) -> MutationResult,
    {
        let shared = &self.shared;
        let now = shared.clock.now();
        let offers = repo::load_offers(&shared.db).await?;
        let mut tx = shared.db.begin();
        let mut cart =
            repo::load_cart(&mut tx, user_id, shared.config.checkout.currency, now).await?;
        let before = repo::load_cart_products(&mut tx, &cart, extra).await?;
        let mut products = before.clone();

        let movements = apply(&mut cart, &mut products, now)?;
        let notice = settle_totals(&mut tx, &mut cart, &products, &offers, now).await?;

        cart.updated_at = now;
        repo::stage_cart(&mut tx, &cart)?;
        repo::stage_changed_products(&mut tx, &before, &products)?;
        tx.commit().await?;
        log_movements(user_id, &movements);

        Ok(CartView {
            summary: cart.summary(Vec::new()),
            notice,
        })
    }
}

type MutationResult = Result<Vec<StockMovement>, CommerceError>;

pub(crate) fn log_movements(user_id: &UserId, movements: &[StockMovement]) {
    for m in movements.iter().filter(|m| !m.is_noop()) {
        tracing::debug!(
            %user_id,
            product_id = %m.product_id,
            size = %m.size,
            stock_delta = m.stock_delta,
            reserved_delta = m.reserved_delta,
            reason = m.reason.as_str(),
            "Stock movement"
        );
    }
}
