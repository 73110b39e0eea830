//! `stockgate-orders` — order domain: the order entity and its status
//! lifecycle. Stock interaction happens in the intake coordinator, not here.

pub mod order;

pub use order::{Order, OrderStatus, MAX_ORDER_QUANTITY};
