//! Audit trail for stock discrepancies.
//!
//! A discrepancy is any situation where the durable ledger and an order's
//! lifecycle disagree (a failed compensating release, a fenced-out writer, a
//! refused reconcile replay). These must surface to operations rather than
//! be silently swallowed.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stockgate_core::{OrderId, ProductId};

/// What went out of sync, and by how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DiscrepancyKind {
    /// A cancellation was recorded but the compensating release failed.
    ReleaseFailed { order_id: OrderId, reason: String },
    /// A stale (fenced-out) writer's debit was refused.
    FencedWrite { token: u64 },
    /// The durable ledger refused a reconcile replay.
    ReconcileRefused { reason: String },
}

/// A single recorded stock discrepancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDiscrepancy {
    pub product_id: ProductId,
    /// Signed stock delta that failed to apply (negative = debit).
    pub delta: i64,
    pub kind: DiscrepancyKind,
    pub occurred_at: DateTime<Utc>,
}

impl StockDiscrepancy {
    pub fn release_failed(
        product_id: ProductId,
        order_id: OrderId,
        qty: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            delta: qty as i64,
            kind: DiscrepancyKind::ReleaseFailed {
                order_id,
                reason: reason.into(),
            },
            occurred_at: Utc::now(),
        }
    }

    pub fn fenced_write(product_id: ProductId, delta: i64, token: u64) -> Self {
        Self {
            product_id,
            delta,
            kind: DiscrepancyKind::FencedWrite { token },
            occurred_at: Utc::now(),
        }
    }

    pub fn reconcile_failure(product_id: ProductId, delta: i64, reason: impl Into<String>) -> Self {
        Self {
            product_id,
            delta,
            kind: DiscrepancyKind::ReconcileRefused {
                reason: reason.into(),
            },
            occurred_at: Utc::now(),
        }
    }
}

/// Sink for stock discrepancies (alerting/audit boundary).
pub trait AuditSink: Send + Sync {
    fn record(&self, discrepancy: StockDiscrepancy);
}

impl<A> AuditSink for Arc<A>
where
    A: AuditSink + ?Sized,
{
    fn record(&self, discrepancy: StockDiscrepancy) {
        (**self).record(discrepancy)
    }
}

/// In-memory collector for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    inner: Mutex<Vec<StockDiscrepancy>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StockDiscrepancy> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, discrepancy: StockDiscrepancy) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.push(discrepancy);
        }
    }
}

/// Sink that emits discrepancies as structured warnings.
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, discrepancy: StockDiscrepancy) {
        warn!(
            product_id = %discrepancy.product_id,
            delta = discrepancy.delta,
            kind = ?discrepancy.kind,
            "stock discrepancy recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_collects_entries() {
        let sink = InMemoryAuditSink::new();
        sink.record(StockDiscrepancy::release_failed(
            ProductId::new(),
            OrderId::new(),
            3,
            "product vanished",
        ));
        sink.record(StockDiscrepancy::fenced_write(ProductId::new(), -2, 7));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            entries[0].kind,
            DiscrepancyKind::ReleaseFailed { .. }
        ));
        assert_eq!(entries[1].delta, -2);
    }
}
