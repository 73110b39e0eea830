//! Optimistic strategy: versioned compare-and-swap with bounded retry.

use std::thread;

use tracing::debug;

use stockgate_core::{ExpectedVersion, ProductId};
use stockgate_stock::StockSnapshot;

use crate::retry::RetryPolicy;
use crate::stock_ledger::{LedgerError, StockLedger};

use super::ReservationStrategy;

/// Lock-free reservations: read `(quantity, version)`, check sufficiency,
/// then apply the decrement only if the stored version is still the one that
/// was read. A lost race re-runs the whole read-compute-apply cycle — never
/// on stale data — up to the policy's attempt bound; exhaustion surfaces the
/// final conflict instead of spinning.
#[derive(Debug)]
pub struct OptimisticStrategy<L> {
    ledger: L,
    retry: RetryPolicy,
}

impl<L> OptimisticStrategy<L> {
    pub fn new(ledger: L, retry: RetryPolicy) -> Self {
        Self { ledger, retry }
    }
}

impl<L> ReservationStrategy for OptimisticStrategy<L>
where
    L: StockLedger,
{
    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            // Fresh read every cycle.
            let observed = self.ledger.get(product_id)?;
            if observed.quantity < qty {
                // Terminal: a shortage is not a race, retrying cannot help.
                return Err(LedgerError::Insufficient {
                    available: observed.quantity,
                    requested: qty,
                });
            }

            match self.ledger.debit_if_version(
                product_id,
                qty,
                ExpectedVersion::Exact(observed.version),
            ) {
                Ok(snapshot) => return Ok(snapshot),
                Err(LedgerError::Conflict(msg)) => {
                    if !self.retry.should_retry(attempt) {
                        debug!(product_id = %product_id, attempt, "retries exhausted");
                        return Err(LedgerError::Conflict(msg));
                    }
                    debug!(product_id = %product_id, attempt, "version conflict, backing off");
                    thread::sleep(self.retry.delay_for_attempt(attempt));
                }
                // Insufficient can surface from the CAS too, when a racer
                // drained the stock between our read and apply.
                Err(other) => return Err(other),
            }
        }
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        self.ledger.release(product_id, qty)
    }
}
