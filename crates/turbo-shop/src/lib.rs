//! Async storefront services for TurboCommerce.
//!
//! Wires the pure rules in `turbo_commerce` to the versioned store in
//! `turbo_db`:
//!
//! - **Carts**: Stock-reserving cart mutations, coupon handling, inline expiry
//! - **Sweeper**: Periodic release of reservations older than the TTL
//! - **Checkout**: Cash on delivery, wallet and gateway payments, compensation
//! - **Orders**: Cancellation, partial cancellation, returns, status progression
//!
//! Every operation runs as one optimistic store transaction and is re-run
//! from scratch when a concurrent writer got there first.
//!
//! # Example
//!
//! ```rust
//! use turbo_shop::prelude::*;
//! use turbo_shop::repo::catalog;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let shop = Shop::builder(Db::in_memory().unwrap()).build();
//!     let tee = Product::new(ProductId::new("tee"), "Tee", Money::from_major(500, Currency::INR))
//!         .with_variant("M", 5);
//!     catalog::put_product(shop.db(), &tee).await.unwrap();
//!
//!     let user = UserId::new("u1");
//!     let view = shop.carts.add_item(&user, &tee.id, "M", 3).await.unwrap();
//!     assert_eq!(view.summary.new_total, Money::from_major(1500, Currency::INR));
//!
//!     let product = catalog::get_product(shop.db(), &tee.id).await.unwrap().unwrap();
//!     assert_eq!(product.variant("M").unwrap().available(), 2);
//! });
//! ```

pub mod audit;
pub mod cart;
pub mod checkout;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod repo;
pub mod response;
pub mod retry;
pub mod shop;
pub mod sweeper;
pub mod telemetry;

pub use audit::{audit_reservations, AuditReport, VariantReport, Violation};
pub use cart::{CartService, CartView};
pub use checkout::{CheckoutReceipt, CheckoutRequest, CheckoutService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ShopConfig};
pub use error::{ShopError, ShopResult};
pub use gateway::{
    DisabledGateway, GatewayError, GatewayOrder, HttpGateway, PaymentGateway, SignatureVerifier,
};
pub use orders::OrderService;
pub use response::{CartResponse, CheckoutResponse, ErrorBody, OrderResponse};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use shop::{Shop, ShopBuilder};
pub use sweeper::{SweepReport, Sweeper};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        AuditReport, CartResponse, CartView, CheckoutReceipt, CheckoutRequest, CheckoutResponse,
        Clock, ManualClock, OrderResponse, PaymentGateway, Shop, ShopConfig, ShopError,
        ShopResult, SweepReport, SystemClock,
    };
    pub use turbo_commerce::prelude::*;
    pub use turbo_db::Db;
}
