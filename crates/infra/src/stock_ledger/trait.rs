use std::sync::Arc;

use thiserror::Error;

use stockgate_core::{ExpectedVersion, ProductId};
use stockgate_stock::StockSnapshot;

/// Stock ledger operation error.
///
/// These are **ledger-level** failures (missing record, shortage, version
/// conflict, storage trouble) as opposed to domain validation, which never
/// reaches the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No record exists for the product.
    #[error("product not found")]
    NotFound,

    /// The record holds fewer units than requested. Terminal; not retryable.
    #[error("insufficient stock. Available: {available}, Requested: {requested}")]
    Insufficient { available: u64, requested: u64 },

    /// A conditional mutation lost a race (version mismatch). Retryable.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// The record already exists (double provisioning).
    #[error("product already provisioned: {0}")]
    AlreadyExists(ProductId),

    /// Backing storage failed (pool, IO, poisoned lock).
    #[error("ledger storage failure: {0}")]
    Storage(String),
}

/// Authoritative, linearizable-per-product stock ledger.
///
/// The ledger exclusively owns each product's `(quantity, version)` pair.
/// Every mutation goes through one of the conditional primitives below, and
/// each primitive is indivisible with respect to all concurrent callers of
/// the same product:
///
/// - `try_reserve` — check-and-decrement in one step; the running quantity
///   can never be observed negative.
/// - `debit_if_version` — compare-and-swap for optimistic callers: the
///   decrement applies only if the stored version still equals the one the
///   caller read.
/// - `release` — unconditional compensating increment.
///
/// Failed operations leave the record byte-for-byte unchanged (quantity and
/// version both). No implementation may hold a cross-product lock.
pub trait StockLedger: Send + Sync {
    /// Create the record for a product at version 1.
    fn provision(&self, product_id: ProductId, initial_quantity: u64)
        -> Result<StockSnapshot, LedgerError>;

    /// Read the current `(quantity, version)` pair.
    fn get(&self, product_id: ProductId) -> Result<StockSnapshot, LedgerError>;

    /// Atomically decrement by `qty` if at least `qty` units are available.
    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError>;

    /// Atomically decrement by `qty` if the stored version matches `expected`
    /// (and at least `qty` units are available).
    fn debit_if_version(
        &self,
        product_id: ProductId,
        qty: u64,
        expected: ExpectedVersion,
    ) -> Result<StockSnapshot, LedgerError>;

    /// Unconditionally increment by `qty` (compensating release).
    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError>;
}

impl<L> StockLedger for Arc<L>
where
    L: StockLedger + ?Sized,
{
    fn provision(
        &self,
        product_id: ProductId,
        initial_quantity: u64,
    ) -> Result<StockSnapshot, LedgerError> {
        (**self).provision(product_id, initial_quantity)
    }

    fn get(&self, product_id: ProductId) -> Result<StockSnapshot, LedgerError> {
        (**self).get(product_id)
    }

    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        (**self).try_reserve(product_id, qty)
    }

    fn debit_if_version(
        &self,
        product_id: ProductId,
        qty: u64,
        expected: ExpectedVersion,
    ) -> Result<StockSnapshot, LedgerError> {
        (**self).debit_if_version(product_id, qty, expected)
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        (**self).release(product_id, qty)
    }
}
