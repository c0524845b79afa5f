//! # Data Models
//!
//! Row types and SQL for the storefront schema in `migrations/`. Every query
//! function is generic over [`sqlx::PgExecutor`] so it runs equally against the
//! pool or inside an open transaction (`&mut *tx`).

pub mod address;
pub mod cart;
pub mod order;
pub mod payment;
pub mod product;
pub mod product_image;
pub mod user;
pub mod verify_email;

pub use address::{Address, NewAddress};
pub use cart::{Cart, CartItem, CartLine};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderLine};
pub use payment::{NewPayment, Payment};
pub use product::{NewProduct, Product};
pub use product_image::{NewProductImage, ProductImage};
pub use user::{NewUser, User};
pub use verify_email::{NewVerifyEmail, VerifyEmail};
