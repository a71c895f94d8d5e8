//! Stock ledger, cart and order domain for TurboCommerce.
//!
//! This crate holds the synchronous rules of the storefront core:
//!
//! - **Catalog**: Products, per-size stock counters, the reservation policy, offers
//! - **Cart**: Cart aggregate, stock-moving mutations, pricing, coupons, availability checks
//! - **Checkout**: Checkout attempt stages, payment methods, orders and their lifecycle
//! - **Wallet**: Balance and transaction ledger
//!
//! Nothing here does I/O. Services load documents, call into this crate, and
//! write the results back in one store transaction.
//!
//! # Example
//!
//! ```rust
//! use turbo_commerce::prelude::*;
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let id = ProductId::new("tee");
//! let mut product = Product::new(id.clone(), "Tee", Money::from_major(500, Currency::INR))
//!     .with_variant("M", 5);
//!
//! let mut cart = Cart::new(UserId::new("u1"), Currency::INR, now);
//! add_item(&mut cart, &id, Some(&mut product), "M", 3, MAX_QUANTITY_PER_ITEM, now).unwrap();
//!
//! assert_eq!(product.variant("M").unwrap().available(), 2);
//! ```

pub mod error;
pub mod ids;
pub mod money;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod customer;
pub mod wallet;

pub use error::{CommerceError, ErrorKind};
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{CommerceError, ErrorKind};
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    // Catalog
    pub use crate::catalog::{
        approve, AdjustmentReason, CategoryOffer, OfferBook, Product, ProductOffer, ProductStatus,
        ReservationIntent, StockMovement, Variant,
    };

    // Cart
    pub use crate::cart::{
        add_item, apply_coupon, change_quantity, change_size, release_expired, release_line,
        remove_coupon, reprice, validate_cart, AppliedCoupon, Cart, CartItem, CartSummary, Coupon,
        ProductMap, UnavailableItem, UnavailableReason, MAX_QUANTITY_PER_ITEM,
    };

    // Checkout
    pub use crate::checkout::{
        commit_cart, CheckoutAttempt, CheckoutStage, GatewayPayment, Order, OrderItem,
        OrderStatus, PaymentKind, PaymentMethod,
    };

    pub use crate::customer::{Address, Customer};
    pub use crate::wallet::{Wallet, WalletReason};
}
