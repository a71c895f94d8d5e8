//! Checkout module.
//!
//! Contains the checkout attempt state machine, payment methods, the cart to
//! order commit, and orders with their lifecycle.

mod commit;
mod flow;
mod order;
mod payment;

pub use commit::{commit_cart, Committed};
pub use flow::{CheckoutAttempt, CheckoutStage};
pub use order::{display_id, ItemStatus, Order, OrderItem, OrderStatus, Restock, Reversal};
pub use payment::{
    check_cod_limit, GatewayPayment, PaymentKind, PaymentMethod, PaymentOutcome, PaymentRecord,
    COD_LIMIT_MAJOR,
};
