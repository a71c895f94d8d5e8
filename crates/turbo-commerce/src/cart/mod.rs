//! Shopping cart module.
//!
//! Contains the cart aggregate, the mutations that keep it in step with the
//! stock ledger, pricing, coupons and availability checks.

#[allow(clippy::module_inception)]
mod cart;
mod coupon;
mod mutation;
mod pricing;
mod validation;

pub use cart::{
    reservation_ttl, Cart, CartItem, CartSummary, UnavailableItem, UnavailableReason,
    MAX_QUANTITY_PER_ITEM, RESERVATION_TTL_SECS,
};
pub use coupon::{apply_coupon, refresh_coupon, remove_coupon, AppliedCoupon, Coupon};
pub use mutation::{add_item, change_quantity, change_size, release_line, LineChange};
pub use pricing::{compute_total, reprice, PricedLines, ProductMap};
pub use validation::{release_expired, validate_cart, CartCheck};
