//! Background release of expired reservations.
//!
//! The sweeper scans carts on an interval and releases lines held longer
//! than the reservation TTL, so abandoned carts return their units even if
//! nobody reads them again. It goes through the same per-line release as the
//! inline check in [`crate::cart::CartService::view_cart`]; whichever runs
//! first releases the line and the other finds nothing to do.

use crate::cart::{log_movements, mirror_key};
use crate::error::ShopResult;
use crate::repo;
use crate::shop::Shared;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use turbo_commerce::cart::{release_expired, Cart};
use turbo_commerce::UserId;

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub carts_scanned: usize,
    /// Carts that had expired lines released.
    pub carts_swept: usize,
    pub lines_released: usize,
    pub units_released: i64,
    /// Carts skipped because of an error; retried next pass.
    pub carts_failed: usize,
}

/// Releases expired reservations.
#[derive(Debug, Clone)]
pub struct Sweeper {
    shared: Arc<Shared>,
}

impl Sweeper {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Sweep every cart once.
    #[tracing::instrument(skip_all)]
    pub async fn run_once(&self) -> ShopResult<SweepReport> {
        let shared = &self.shared;
        let now = shared.clock.now();
        let ttl = shared.config.reservation_ttl();
        let carts = shared.db.scan::<Cart>(repo::CARTS).await?;

        let mut report = SweepReport {
            carts_scanned: carts.len(),
            ..Default::default()
        };
        for (_, doc) in carts {
            let cart = doc.into_inner();
            if !cart.has_expired(now, ttl) {
                continue;
            }
            let user_id = cart.user_id;
            match shared
                .retry
                .run("sweep_cart", || self.sweep_cart(&user_id))
                .await
            {
                Ok((0, _)) => {}
                Ok((lines, units)) => {
                    report.carts_swept += 1;
                    report.lines_released += lines;
                    report.units_released += units;
                    shared.cache.delete(&mirror_key(&user_id));
                }
                Err(err) => {
                    report.carts_failed += 1;
                    tracing::warn!(%user_id, error = %err, "Failed to sweep cart");
                }
            }
        }

        if report.lines_released > 0 || report.carts_failed > 0 {
            tracing::info!(
                carts_swept = report.carts_swept,
                lines_released = report.lines_released,
                units_released = report.units_released,
                carts_failed = report.carts_failed,
                "Released expired reservations"
            );
        }
        Ok(report)
    }

    /// Returns (lines released, units released).
    async fn sweep_cart(&self, user_id: &UserId) -> ShopResult<(usize, i64)> {
        let shared = &self.shared;
        let now = shared.clock.now();
        let offers = repo::load_offers(&shared.db).await?;
        let mut tx = shared.db.begin();
        let Some(mut cart) = tx.get::<Cart>(repo::CARTS, user_id.as_str()).await? else {
            return Ok((0, 0));
        };
        let before = repo::load_cart_products(&mut tx, &cart, None).await?;
        let mut products = before.clone();

        let check =
            release_expired(&mut cart, &mut products, now, shared.config.reservation_ttl())?;
        if check.unavailable.is_empty() {
            return Ok((0, 0));
        }
        crate::cart::settle_totals(&mut tx, &mut cart, &products, &offers, now).await?;
        cart.updated_at = now;
        repo::stage_cart(&mut tx, &cart)?;
        repo::stage_changed_products(&mut tx, &before, &products)?;
        tx.commit().await?;

        log_movements(user_id, &check.movements);
        let units: i64 = check.movements.iter().map(|m| -m.reserved_delta).sum();
        Ok((check.unavailable.len(), units))
    }

    /// Run [`Sweeper::run_once`] every `sweep_interval` until `shutdown` is
    /// cancelled.
    ///
    /// A failing or panicking pass is logged and the loop keeps going.
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let sweeper = self.clone();
        let period = self.shared.config.sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(?period, "Reservation sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match AssertUnwindSafe(sweeper.run_once()).catch_unwind().await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => tracing::error!(error = %err, "Sweeper pass failed"),
                    Err(panic) => {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(panic = %message, "Sweeper pass panicked");
                    }
                }
            }
            tracing::info!("Reservation sweeper stopped");
        })
    }
}
