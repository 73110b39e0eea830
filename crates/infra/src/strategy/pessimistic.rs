//! Pessimistic strategy: exclusive per-product lock around check-then-decrement.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use stockgate_core::ProductId;
use stockgate_stock::StockSnapshot;

use crate::stock_ledger::{LedgerError, StockLedger};

use super::ReservationStrategy;

/// Per-product exclusive lock registry.
///
/// Locks are identified by `ProductId`, so unrelated products never contend
/// and no caller ever holds more than one product lock (no deadlock surface).
/// Acquisition waits up to a deadline and then gives up instead of blocking
/// indefinitely.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<ProductId>>,
    released: Condvar,
}

/// RAII guard for a product lock; releasing wakes all waiters.
#[derive(Debug)]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    product_id: ProductId,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for `product_id`, waiting at most
    /// `wait_timeout`. A timed-out wait fails rather than hangs.
    pub fn acquire(
        &self,
        product_id: ProductId,
        wait_timeout: Duration,
    ) -> Result<LockGuard<'_>, LedgerError> {
        let deadline = Instant::now() + wait_timeout;

        let mut held = self
            .held
            .lock()
            .map_err(|_| LedgerError::Storage("lock table poisoned".to_string()))?;

        while held.contains(&product_id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LedgerError::Conflict(format!(
                    "lock wait timed out after {}ms",
                    wait_timeout.as_millis()
                )));
            }

            let (guard, wait) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| LedgerError::Storage("lock table poisoned".to_string()))?;
            held = guard;

            if wait.timed_out() && held.contains(&product_id) {
                return Err(LedgerError::Conflict(format!(
                    "lock wait timed out after {}ms",
                    wait_timeout.as_millis()
                )));
            }
        }

        held.insert(product_id);
        Ok(LockGuard {
            table: self,
            product_id,
        })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.table.held.lock() {
            held.remove(&self.product_id);
        }
        self.table.released.notify_all();
    }
}

/// Strictly serialized reservations: the product lock is taken before the
/// quantity is read and held through the decrement. Callers block (bounded by
/// `lock_wait`) instead of spinning; a timed-out wait surfaces as a retryable
/// conflict.
#[derive(Debug)]
pub struct PessimisticStrategy<L> {
    ledger: L,
    locks: LockTable,
    lock_wait: Duration,
}

impl<L> PessimisticStrategy<L> {
    pub fn new(ledger: L, lock_wait: Duration) -> Self {
        Self {
            ledger,
            locks: LockTable::new(),
            lock_wait,
        }
    }
}

impl<L> ReservationStrategy for PessimisticStrategy<L>
where
    L: StockLedger,
{
    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        let _guard = self.locks.acquire(product_id, self.lock_wait)?;
        debug!(product_id = %product_id, qty, "acquired product lock");

        // Check-then-decrement runs entirely under the guard; the ledger
        // primitive is atomic on its own, the lock adds strict serialization
        // (and bounded blocking) per product.
        self.ledger.try_reserve(product_id, qty)
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        // A blind increment needs no lock.
        self.ledger.release(product_id, qty)
    }
}
