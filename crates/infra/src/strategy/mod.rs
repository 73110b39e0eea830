//! Concurrency-control strategies guarding stock mutations.
//!
//! Each strategy is a standalone implementation of the same `{try_reserve,
//! release}` capability, selected by configuration. Failure modes are
//! expressed through `LedgerError`, so callers cannot tell strategies apart
//! from error shape.

use core::str::FromStr;
use std::sync::Arc;

use stockgate_core::ProductId;
use stockgate_stock::StockSnapshot;

use crate::stock_ledger::LedgerError;

pub mod distributed;
pub mod optimistic;
pub mod pessimistic;
#[cfg(feature = "redis")]
pub mod redis_lease;

pub use distributed::{DistributedStrategy, InMemoryLeaseProvider, Lease, LeaseError, LeaseProvider, ReconcilerHandle};
pub use optimistic::OptimisticStrategy;
pub use pessimistic::PessimisticStrategy;
#[cfg(feature = "redis")]
pub use redis_lease::RedisLeaseProvider;

/// Conditional-reservation capability guarded by a concurrency-control
/// algorithm.
///
/// Implementations must guarantee that across any set of concurrent
/// `try_reserve` callers for one product, the total accepted quantity never
/// exceeds what was available when the contention window opened, and that a
/// failed attempt leaves the ledger unchanged.
pub trait ReservationStrategy: Send + Sync {
    /// Conditionally reserve `qty` units of `product_id`.
    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError>;

    /// Compensating release of `qty` previously reserved units.
    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError>;
}

impl<S> ReservationStrategy for Arc<S>
where
    S: ReservationStrategy + ?Sized,
{
    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        (**self).try_reserve(product_id, qty)
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        (**self).release(product_id, qty)
    }
}

/// Which concurrency-control algorithm guards reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Pessimistic,
    Optimistic,
    Distributed,
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::Pessimistic
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pessimistic" => Ok(Self::Pessimistic),
            "optimistic" => Ok(Self::Optimistic),
            "distributed" => Ok(Self::Distributed),
            other => Err(format!(
                "unknown strategy '{other}' (expected pessimistic, optimistic, or distributed)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_parses_known_names() {
        assert_eq!(
            " Pessimistic ".parse::<StrategyKind>().unwrap(),
            StrategyKind::Pessimistic
        );
        assert_eq!(
            "optimistic".parse::<StrategyKind>().unwrap(),
            StrategyKind::Optimistic
        );
        assert_eq!(
            "distributed".parse::<StrategyKind>().unwrap(),
            StrategyKind::Distributed
        );
        assert!("mutexes".parse::<StrategyKind>().is_err());
    }
}
