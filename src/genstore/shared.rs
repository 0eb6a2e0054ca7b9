//! Shared generation store over a remote counter service.
//!
//! Generations live under `gen:<ns>:<storage_key>` in an external key/value
//! service with native atomic increments, so they survive restarts and are
//! visible to every replica. The service is reached through the
//! [`CounterTransport`] port; concrete clients (Redis and friends) implement
//! it out of tree.
//!
//! When a positive TTL is configured, every bump refreshes it in the same
//! round trip as the increment, so there is no window where the counter
//! exists without a fresh TTL. Counter expiry resets a key to "missing",
//! which reads as generation 0; cache entries carrying larger generations
//! then fail read-side validation and self-heal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::GenStore;
use crate::error::{Error, Result};

/// Transport port for a remote atomic counter service.
///
/// Implementations must be safe for concurrent use. `incr_with_ttl` must
/// apply the increment and the TTL refresh in a single round trip (pipelined
/// or scripted).
#[async_trait]
pub trait CounterTransport: Send + Sync {
    /// Atomically increments the counter at `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Like [`incr`](CounterTransport::incr), but also refreshes the key's
    /// TTL in the same round trip.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Reads the raw stored value; `None` on a missing or expired key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Batched read; one `None`/value per requested key, in request order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Releases the underlying client.
    async fn close(&self) -> Result<()>;
}

/// Generation store sharing counters across processes via a
/// [`CounterTransport`].
pub struct SharedGenStore {
    transport: Arc<dyn CounterTransport>,
    namespace: String,
    /// Zero disables expiry of generation keys.
    ttl: Duration,
}

impl SharedGenStore {
    /// Shared store without TTL on generation keys.
    pub fn new(transport: Arc<dyn CounterTransport>, namespace: impl Into<String>) -> Self {
        Self::with_ttl(transport, namespace, Duration::ZERO)
    }

    /// Shared store with a TTL applied to generation keys to bound growth.
    /// A zero `ttl` disables expiry.
    pub fn with_ttl(
        transport: Arc<dyn CounterTransport>,
        namespace: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
            ttl,
        }
    }

    fn key(&self, storage_key: &str) -> String {
        format!("gen:{}:{}", self.namespace, storage_key)
    }

    fn parse(storage_key: &str, raw: &str) -> Result<u64> {
        raw.parse::<u64>().map_err(|e| {
            Error::transport(format!(
                "generation value at {storage_key} is not an integer: {e}"
            ))
        })
    }
}

#[async_trait]
impl GenStore for SharedGenStore {
    async fn snapshot(&self, storage_key: &str) -> Result<u64> {
        match self.transport.get(&self.key(storage_key)).await? {
            Some(raw) => Self::parse(storage_key, &raw),
            None => Ok(0),
        }
    }

    async fn snapshot_many(&self, storage_keys: &[String]) -> Result<HashMap<String, u64>> {
        if storage_keys.is_empty() {
            return Ok(HashMap::new());
        }
        let prefixed: Vec<String> = storage_keys.iter().map(|k| self.key(k)).collect();
        let values = self.transport.get_many(&prefixed).await?;

        let mut out = HashMap::with_capacity(storage_keys.len());
        for (k, raw) in storage_keys.iter().zip(values) {
            let gen = match raw {
                Some(raw) => Self::parse(k, &raw)?,
                None => 0,
            };
            out.insert(k.clone(), gen);
        }
        Ok(out)
    }

    async fn bump(&self, storage_key: &str) -> Result<u64> {
        let key = self.key(storage_key);
        if self.ttl > Duration::ZERO {
            self.transport.incr_with_ttl(&key, self.ttl).await
        } else {
            self.transport.incr(&key).await
        }
    }

    // Counter backends expire natively; nothing to prune here.
    fn cleanup(&self, _retention: Duration) {}

    async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

// =============================================================================
// Tests
// =============================================================================
