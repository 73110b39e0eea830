//! Distributed-lock-with-cache strategy.
//!
//! A leased, fenced mutex keyed by product guards a fast in-memory counter;
//! accepted mutations are queued as deltas and a background reconciler
//! replays them into the durable ledger. The lease carries a fencing token
//! (monotonically increasing grant counter) so a delayed writer whose lease
//! expired can never apply a decrement behind a newer lease holder's back.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use stockgate_core::ProductId;
use stockgate_stock::StockSnapshot;

use crate::audit::{AuditSink, StockDiscrepancy};
use crate::stock_ledger::{LedgerError, StockLedger};

use super::ReservationStrategy;

/// A granted, time-limited exclusive hold on a product's cache counter.
#[derive(Debug, Clone)]
pub struct Lease {
    pub product_id: ProductId,
    /// Fencing token: strictly increases across grants for the same product.
    pub token: u64,
    pub expires_at: Instant,
}

impl Lease {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease acquisition timed out after {0}ms")]
    AcquireTimeout(u128),

    #[error("lease backend failure: {0}")]
    Backend(String),
}

/// External mutex service handing out fenced, TTL-bounded leases.
pub trait LeaseProvider: Send + Sync {
    /// Acquire the lease for `product_id`, waiting at most `wait_timeout`.
    /// An expired lease is claimable by the next caller without cooperation
    /// from the stalled holder.
    fn acquire(
        &self,
        product_id: ProductId,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<Lease, LeaseError>;

    /// Release a held lease. Releasing an already-expired or superseded lease
    /// is a no-op.
    fn release(&self, lease: &Lease) -> Result<(), LeaseError>;
}

impl<P> LeaseProvider for Arc<P>
where
    P: LeaseProvider + ?Sized,
{
    fn acquire(
        &self,
        product_id: ProductId,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<Lease, LeaseError> {
        (**self).acquire(product_id, ttl, wait_timeout)
    }

    fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        (**self).release(lease)
    }
}

#[derive(Debug, Clone, Copy)]
struct HeldLease {
    token: u64,
    expires_at: Instant,
}

/// In-process lease provider for tests/dev.
///
/// Tokens come from a single monotonic counter, so a re-grant after expiry
/// always carries a strictly greater fencing token.
#[derive(Debug, Default)]
pub struct InMemoryLeaseProvider {
    held: Mutex<HashMap<ProductId, HeldLease>>,
    released: Condvar,
    next_token: AtomicU64,
}

impl InMemoryLeaseProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseProvider for InMemoryLeaseProvider {
    fn acquire(
        &self,
        product_id: ProductId,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<Lease, LeaseError> {
        let deadline = Instant::now() + wait_timeout;

        let mut held = self
            .held
            .lock()
            .map_err(|_| LeaseError::Backend("lease table poisoned".to_string()))?;

        loop {
            let now = Instant::now();

            let current = held.get(&product_id).copied();
            let blocked_until = match current {
                Some(l) if l.expires_at > now => l.expires_at,
                _ => {
                    // Free (or expired): grant a fresh, strictly newer token.
                    let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
                    let expires_at = now + ttl;
                    held.insert(product_id, HeldLease { token, expires_at });
                    return Ok(Lease {
                        product_id,
                        token,
                        expires_at,
                    });
                }
            };

            if now >= deadline {
                return Err(LeaseError::AcquireTimeout(wait_timeout.as_millis()));
            }

            // Wake at whichever comes first: holder's expiry or our deadline.
            let wait = blocked_until.min(deadline) - now;
            let (guard, _) = self
                .released
                .wait_timeout(held, wait)
                .map_err(|_| LeaseError::Backend("lease table poisoned".to_string()))?;
            held = guard;
        }
    }

    fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| LeaseError::Backend("lease table poisoned".to_string()))?;

        // Only the current token may free the slot; a stale release must not
        // evict a newer holder.
        if let Some(current) = held.get(&lease.product_id) {
            if current.token == lease.token {
                held.remove(&lease.product_id);
            }
        }
        self.released.notify_all();
        Ok(())
    }
}

/// A cache mutation awaiting replay into the durable ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDelta {
    pub product_id: ProductId,
    /// Negative for reservations, positive for releases.
    pub delta: i64,
    /// Fencing token of the lease under which the mutation was accepted.
    pub token: u64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    available: u64,
    version: u64,
}

/// State shared between the request path and the reconciler.
#[derive(Debug, Default)]
pub struct DistributedShared {
    cache: Mutex<HashMap<ProductId, CacheEntry>>,
    pending: Mutex<VecDeque<PendingDelta>>,
    /// Highest fencing token durably applied per product.
    fence: Mutex<HashMap<ProductId, u64>>,
}

impl DistributedShared {
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn push_delta(&self, delta: PendingDelta) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(delta);
        }
    }

    fn credit_cache(&self, product_id: ProductId, qty: u64) {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(entry) = cache.get_mut(&product_id) {
                entry.available = entry.available.saturating_add(qty);
                entry.version += 1;
            }
        }
    }
}

/// Tunables for the distributed strategy.
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    pub lease_ttl: Duration,
    pub lease_wait: Duration,
    pub reconcile_interval: Duration,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_millis(5000),
            lease_wait: Duration::from_millis(2000),
            reconcile_interval: Duration::from_millis(100),
        }
    }
}

/// Highest-throughput strategy: reservations run against a lease-guarded
/// cache counter; the durable ledger catches up within a bounded
/// reconciliation window. Failed or fenced-out replays are compensated,
/// never dropped.
#[derive(Debug)]
pub struct DistributedStrategy<L, P> {
    ledger: L,
    leases: P,
    shared: Arc<DistributedShared>,
    config: DistributedConfig,
}

impl<L, P> DistributedStrategy<L, P>
where
    L: StockLedger,
    P: LeaseProvider,
{
    pub fn new(ledger: L, leases: P, config: DistributedConfig) -> Self {
        Self {
            ledger,
            leases,
            shared: Arc::new(DistributedShared::default()),
            config,
        }
    }

    /// Shared cache/queue state, for wiring up the reconciler.
    pub fn shared(&self) -> Arc<DistributedShared> {
        self.shared.clone()
    }

    fn acquire_lease(&self, product_id: ProductId) -> Result<Lease, LedgerError> {
        self.leases
            .acquire(product_id, self.config.lease_ttl, self.config.lease_wait)
            .map_err(|e| match e {
                LeaseError::AcquireTimeout(_) => LedgerError::Conflict(e.to_string()),
                LeaseError::Backend(msg) => LedgerError::Storage(msg),
            })
    }

    fn release_lease(&self, lease: &Lease) {
        if let Err(e) = self.leases.release(lease) {
            warn!(product_id = %lease.product_id, error = %e, "lease release failed");
        }
    }

    /// Run the cache mutation under an exclusive, unexpired lease.
    fn with_lease<T>(
        &self,
        product_id: ProductId,
        f: impl FnOnce(&Lease) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let lease = self.acquire_lease(product_id)?;

        // A writer whose lease lapsed before it got to write must not touch
        // the cache: its fencing token is already stale.
        let result = if lease.is_expired() {
            Err(LedgerError::Conflict(
                "lease expired before the cache write".to_string(),
            ))
        } else {
            f(&lease)
        };

        self.release_lease(&lease);
        result
    }

    fn seeded_entry<'c>(
        &self,
        cache: &'c mut HashMap<ProductId, CacheEntry>,
        product_id: ProductId,
    ) -> Result<&'c mut CacheEntry, LedgerError> {
        match cache.entry(product_id) {
            std::collections::hash_map::Entry::Occupied(e) => Ok(e.into_mut()),
            std::collections::hash_map::Entry::Vacant(v) => {
                let snapshot = self.ledger.get(product_id)?;
                Ok(v.insert(CacheEntry {
                    available: snapshot.quantity,
                    version: snapshot.version,
                }))
            }
        }
    }
}

impl<L, P> ReservationStrategy for DistributedStrategy<L, P>
where
    L: StockLedger,
    P: LeaseProvider,
{
    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        self.with_lease(product_id, |lease| {
            let mut cache = self
                .shared
                .cache
                .lock()
                .map_err(|_| LedgerError::Storage("cache poisoned".to_string()))?;

            let entry = self.seeded_entry(&mut cache, product_id)?;

            if entry.available < qty {
                return Err(LedgerError::Insufficient {
                    available: entry.available,
                    requested: qty,
                });
            }

            entry.available -= qty;
            entry.version += 1;
            let snapshot = StockSnapshot {
                product_id,
                quantity: entry.available,
                version: entry.version,
            };
            drop(cache);

            self.shared.push_delta(PendingDelta {
                product_id,
                delta: -(qty as i64),
                token: lease.token,
            });

            debug!(product_id = %product_id, qty, token = lease.token, "cache debit accepted");
            Ok(snapshot)
        })
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        self.with_lease(product_id, |lease| {
            let mut cache = self
                .shared
                .cache
                .lock()
                .map_err(|_| LedgerError::Storage("cache poisoned".to_string()))?;

            let entry = self.seeded_entry(&mut cache, product_id)?;
            entry.available = entry.available.saturating_add(qty);
            entry.version += 1;
            let snapshot = StockSnapshot {
                product_id,
                quantity: entry.available,
                version: entry.version,
            };
            drop(cache);

            self.shared.push_delta(PendingDelta {
                product_id,
                delta: qty as i64,
                token: lease.token,
            });

            Ok(snapshot)
        })
    }
}

/// Handle to control and join the background reconciler.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Request graceful shutdown and wait for the worker to stop. Performs a
    /// final drain so accepted deltas are not stranded in memory.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background reconciler: replays pending cache deltas into the durable
/// ledger, enforcing fencing on the way.
#[derive(Debug)]
pub struct Reconciler;

impl Reconciler {
    pub fn spawn<L, A>(
        name: &'static str,
        ledger: L,
        shared: Arc<DistributedShared>,
        audit: A,
        interval: Duration,
    ) -> ReconcilerHandle
    where
        L: StockLedger + 'static,
        A: AuditSink + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            reconcile_once(&ledger, &shared, &audit);
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            reconcile_once(&ledger, &shared, &audit);
                        }
                    }
                }
            })
            .expect("failed to spawn reconciler thread");

        ReconcilerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

/// Drain the pending queue once. Public for deterministic tests.
///
/// - Fenced-out debits (token below one already durably applied) are refused
///   and compensated back into the cache.
/// - Storage failures requeue the delta for the next pass; nothing is
///   silently dropped.
pub fn reconcile_once<L, A>(ledger: &L, shared: &Arc<DistributedShared>, audit: &A)
where
    L: StockLedger,
    A: AuditSink,
{
    let drained: Vec<PendingDelta> = {
        let mut pending = match shared.pending.lock() {
            Ok(p) => p,
            Err(_) => return,
        };
        pending.drain(..).collect()
    };

    for delta in drained {
        let fenced_out = {
            let fence = shared.fence.lock().ok();
            fence
                .as_ref()
                .and_then(|f| f.get(&delta.product_id))
                .is_some_and(|highest| delta.token < *highest)
        };

        if fenced_out && delta.delta < 0 {
            warn!(
                product_id = %delta.product_id,
                token = delta.token,
                "fenced out stale debit; compensating cache"
            );
            shared.credit_cache(delta.product_id, delta.delta.unsigned_abs());
            audit.record(StockDiscrepancy::fenced_write(
                delta.product_id,
                delta.delta,
                delta.token,
            ));
            continue;
        }

        let applied = if delta.delta < 0 {
            ledger.try_reserve(delta.product_id, delta.delta.unsigned_abs())
        } else {
            ledger.release(delta.product_id, delta.delta as u64)
        };

        match applied {
            Ok(_) => {
                if let Ok(mut fence) = shared.fence.lock() {
                    let entry = fence.entry(delta.product_id).or_insert(0);
                    *entry = (*entry).max(delta.token);
                }
            }
            Err(LedgerError::Storage(msg)) => {
                // Transient: put it back and try again next tick.
                warn!(product_id = %delta.product_id, error = %msg, "reconcile replay failed; requeueing");
                if let Ok(mut pending) = shared.pending.lock() {
                    pending.push_front(delta);
                }
            }
            Err(e) => {
                // The durable ledger disagrees with the cache (drift, vanished
                // product). Compensate the cache for refused debits and leave
                // an audit trail either way.
                warn!(product_id = %delta.product_id, error = %e, "reconcile replay refused");
                if delta.delta < 0 {
                    shared.credit_cache(delta.product_id, delta.delta.unsigned_abs());
                }
                audit.record(StockDiscrepancy::reconcile_failure(
                    delta.product_id,
                    delta.delta,
                    e.to_string(),
                ));
            }
        }
    }
}
