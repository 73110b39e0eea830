//! Stock ledger: the authoritative `(quantity, version)` record per product
//! and its atomic conditional mutation primitives.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use r#trait::{LedgerError, StockLedger};
