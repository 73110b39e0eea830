//! Redis-backed lease provider (fenced distributed mutex).
//!
//! - **Lease key**: `stockgate:lease:<product_id>`, written with `SET NX PX`
//!   so acquisition and TTL are one atomic step.
//! - **Fencing tokens**: `INCR stockgate:lease:fence` — a single monotonic
//!   counter shared by all products, so any re-grant carries a strictly
//!   greater token than every earlier grant.
//! - **Release**: deletes the key only while it still holds our token, so a
//!   stale release cannot evict a newer holder.

use std::thread;
use std::time::{Duration, Instant};

use stockgate_core::ProductId;

use super::distributed::{Lease, LeaseError, LeaseProvider};

/// Default polling interval while waiting for a busy lease.
const DEFAULT_ACQUIRE_POLL_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct RedisLeaseProvider {
    client: std::sync::Arc<redis::Client>,
    key_prefix: String,
    acquire_poll: Duration,
}

impl RedisLeaseProvider {
    /// Create a provider from a Redis URL (e.g. "redis://localhost:6379").
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, LeaseError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| LeaseError::Backend(e.to_string()))?;

        Ok(Self {
            client: std::sync::Arc::new(client),
            key_prefix: "stockgate:lease".to_string(),
            acquire_poll: Duration::from_millis(DEFAULT_ACQUIRE_POLL_MS),
        })
    }

    fn lease_key(&self, product_id: ProductId) -> String {
        format!("{}:{}", self.key_prefix, product_id)
    }

    fn fence_key(&self) -> String {
        format!("{}:fence", self.key_prefix)
    }

    fn connection(&self) -> Result<redis::Connection, LeaseError> {
        self.client
            .get_connection()
            .map_err(|e| LeaseError::Backend(e.to_string()))
    }
}

impl LeaseProvider for RedisLeaseProvider {
    fn acquire(
        &self,
        product_id: ProductId,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<Lease, LeaseError> {
        let mut conn = self.connection()?;
        let key = self.lease_key(product_id);
        let deadline = Instant::now() + wait_timeout;

        loop {
            let token: u64 = redis::cmd("INCR")
                .arg(self.fence_key())
                .query(&mut conn)
                .map_err(|e| LeaseError::Backend(e.to_string()))?;

            // SET key token NX PX ttl — atomic claim-with-expiry.
            let claimed: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query(&mut conn)
                .map_err(|e| LeaseError::Backend(e.to_string()))?;

            if claimed.is_some() {
                return Ok(Lease {
                    product_id,
                    token,
                    expires_at: Instant::now() + ttl,
                });
            }

            if Instant::now() >= deadline {
                return Err(LeaseError::AcquireTimeout(wait_timeout.as_millis()));
            }

            thread::sleep(self.acquire_poll);
        }
    }

    fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        let mut conn = self.connection()?;
        let key = self.lease_key(lease.product_id);

        // Delete only while the key still holds our token (single-script
        // check-and-delete so a newer holder is never evicted).
        let script = redis::Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        );

        let _: i64 = script
            .key(&key)
            .arg(lease.token)
            .invoke(&mut conn)
            .map_err(|e| LeaseError::Backend(e.to_string()))?;

        Ok(())
    }
}
