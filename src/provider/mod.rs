//! Value-Store Port
//!
//! The storage abstraction the cache writes through. Implementations MUST be
//! byte-for-byte transparent: `get` returns exactly the bytes previously
//! passed to `set` for the same key. No prepended or appended metadata, no
//! re-encoding, no mutation. A store that transforms internally (for example
//! compression) must fully reverse the transform.
//!
//! The keyspaces `single:<ns>:` and `bulk:<ns>:` are owned by the cache.
//! External code must not write under these prefixes; foreign writes fail
//! strict wire validation and are deleted on read.

mod memory;

pub use memory::MemoryProvider;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A minimal byte store with TTLs.
///
/// Must be safe for concurrent use. A `ttl` of [`Duration::ZERO`] means "no
/// expiry" where the store supports it; some stores apply a global lifetime
/// instead.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns `Some(bytes)` on hit, `None` on miss. IO/remote failures are
    /// returned as errors.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Stores `value` with the given TTL. `cost` is an advisory hint that
    /// stores without cost-based admission may ignore.
    ///
    /// Returns `Ok(false)` when the store intentionally refused the write
    /// under pressure (admission control or an eviction race). The cache
    /// treats that as a soft miss, not an error.
    async fn set(&self, key: &str, value: Bytes, cost: i64, ttl: Duration) -> Result<bool>;

    /// Removes a key (best-effort).
    async fn delete(&self, key: &str) -> Result<()>;

    /// Releases resources.
    async fn close(&self) -> Result<()>;
}
