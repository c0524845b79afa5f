//! # Order Lifecycle Operations
//!
//! Cancellation with restock, status advancement and the single-primary
//! exchanges for addresses and product images.

pub mod orders;
pub mod primary;

pub use orders::OrderLifecycle;
pub use primary::{AddressBook, ProductGallery};
