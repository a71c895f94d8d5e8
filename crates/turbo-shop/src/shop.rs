//! Shop assembly.

use crate::audit::{audit_reservations, AuditReport};
use crate::cart::CartService;
use crate::checkout::CheckoutService;
use crate::clock::{Clock, SystemClock};
use crate::config::ShopConfig;
use crate::error::ShopResult;
use crate::gateway::{DisabledGateway, PaymentGateway, SignatureVerifier};
use crate::orders::OrderService;
use crate::retry::RetryPolicy;
use crate::sweeper::Sweeper;
use std::sync::Arc;
use turbo_cache::Cache;
use turbo_db::Db;

/// State shared by every service.
pub(crate) struct Shared {
    pub db: Db,
    pub cache: Cache,
    pub clock: Arc<dyn Clock>,
    pub config: ShopConfig,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("clock", &self.clock)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// The assembled services over one store.
///
/// # Example
///
/// ```rust
/// use turbo_shop::{Shop, ShopConfig};
/// use turbo_db::Db;
///
/// let shop = Shop::builder(Db::in_memory()?)
///     .config(ShopConfig::default())
///     .build();
/// assert_eq!(shop.config().reservation.ttl_secs, 600);
/// # Ok::<(), turbo_db::DbError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Shop {
    shared: Arc<Shared>,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub sweeper: Sweeper,
}

impl Shop {
    /// Start building a shop over `db`.
    pub fn builder(db: Db) -> ShopBuilder {
        ShopBuilder::new(db)
    }

    pub fn config(&self) -> &ShopConfig {
        &self.shared.config
    }

    pub fn db(&self) -> &Db {
        &self.shared.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    /// Check the reservation invariant across the whole store.
    pub async fn audit(&self) -> ShopResult<AuditReport> {
        audit_reservations(
            &self.shared.db,
            self.shared.clock.now(),
            self.shared.config.reservation_ttl(),
        )
        .await
    }
}

/// Builder for [`Shop`].
pub struct ShopBuilder {
    db: Db,
    config: ShopConfig,
    cache: Option<Cache>,
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn PaymentGateway>,
    retry: Option<RetryPolicy>,
}

impl ShopBuilder {
    fn new(db: Db) -> Self {
        Self {
            db,
            config: ShopConfig::default(),
            cache: None,
            clock: Arc::new(SystemClock),
            gateway: Arc::new(DisabledGateway),
            retry: None,
        }
    }

    pub fn config(mut self, config: ShopConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing cache for the session mirror.
    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Override the retry policy derived from the config.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Shop {
        let retry = self.retry.unwrap_or_else(|| self.config.retry_policy());
        let cache = self
            .cache
            .unwrap_or_else(|| Cache::new(self.config.summary_ttl()));
        let verifier = SignatureVerifier::new(&self.config.gateway.key_secret);
        let shared = Arc::new(Shared {
            db: self.db,
            cache,
            clock: self.clock,
            config: self.config,
            retry,
        });

        Shop {
            carts: CartService::new(shared.clone()),
            checkout: CheckoutService::new(shared.clone(), self.gateway, verifier),
            orders: OrderService::new(shared.clone()),
            sweeper: Sweeper::new(shared.clone()),
            shared,
        }
    }
}
