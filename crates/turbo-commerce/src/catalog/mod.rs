//! Product catalog module.
//!
//! Contains products, per-size stock counters, the reservation policy and
//! offers.

mod inventory;
mod offer;
mod product;
pub mod reservation;

pub use inventory::{AdjustmentReason, StockMovement, Variant};
pub use offer::{CategoryOffer, OfferBook, PriceSource, ProductOffer};
pub use product::{Product, ProductStatus};
pub use reservation::{approve, Approval, ReservationIntent};
