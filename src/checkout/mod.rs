//! # Checkout
//!
//! Cart mutation and the atomic cart → order conversion.

pub mod cart;
pub mod workflow;

pub use cart::CartService;
pub use workflow::{order_total, CheckoutReceipt, CheckoutRequest, CheckoutWorkflow};
