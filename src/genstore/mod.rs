//! Generation-Store Port
//!
//! A [`GenStore`] keeps the per-storage-key monotonic generation counters the
//! CAS protocol validates against. Generations only increase; a missing key
//! reads as generation 0, which is always safe: stale writes get skipped and
//! stale reads self-heal in the cache layer.

mod local;
mod shared;

pub use local::LocalGenStore;
pub use shared::{CounterTransport, SharedGenStore};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Abstracts where generations live.
///
/// Use [`LocalGenStore`] (the default) for in-process generations, or
/// [`SharedGenStore`] over a [`CounterTransport`] for generations shared
/// across replicas and restarts.
#[async_trait]
pub trait GenStore: Send + Sync {
    /// Returns the current generation; missing key => 0.
    async fn snapshot(&self, storage_key: &str) -> Result<u64>;

    /// Returns generations for many keys in one batched read; missing
    /// keys map to 0.
    async fn snapshot_many(&self, storage_keys: &[String]) -> Result<HashMap<String, u64>>;

    /// Atomically increments and returns the new generation.
    async fn bump(&self, storage_key: &str) -> Result<u64>;

    /// Prunes old metadata if applicable. No-op for backends with native
    /// expiration.
    fn cleanup(&self, retention: Duration);

    /// Releases resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}
