//! In-memory provider backed by a concurrent map.
//!
//! Reference implementation of the [`Provider`] contract: per-entry TTLs with
//! lazy expiry on read, byte-for-byte transparency, and entry/byte
//! accounting. Suitable for tests and single-process deployments.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::Provider;
use crate::error::Result;

struct MemEntry {
    data: Bytes,
    /// None => no expiry
    expires_at: Option<Instant>,
}

impl MemEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

/// Thread-safe in-memory byte store with per-entry TTLs.
///
/// Expired entries are dropped lazily on the next read of their key; there is
/// no background reaper.
#[derive(Default)]
pub struct MemoryProvider {
    entries: DashMap<String, MemEntry>,
    total_bytes: AtomicU64,
}

impl MemoryProvider {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next read).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes currently stored.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// True if any stored key starts with `prefix`. Test/diagnostic helper.
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.entries.iter().any(|e| e.key().starts_with(prefix))
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if !entry.is_expired(now) {
                    return Ok(Some(entry.data.clone()));
                }
                true
            }
            None => false,
        };

        if expired {
            if let Some((_, old)) = self.entries.remove(key) {
                self.total_bytes
                    .fetch_sub(old.data.len() as u64, Ordering::Relaxed);
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, _cost: i64, ttl: Duration) -> Result<bool> {
        let expires_at = if ttl > Duration::ZERO {
            Some(Instant::now() + ttl)
        } else {
            None
        };

        let size = value.len() as u64;
        let old = self.entries.insert(
            key.to_string(),
            MemEntry {
                data: value,
                expires_at,
            },
        );

        if let Some(old) = old {
            self.total_bytes
                .fetch_sub(old.data.len() as u64, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some((_, old)) = self.entries.remove(key) {
            self.total_bytes
                .fetch_sub(old.data.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_transparent() {
        let p = MemoryProvider::new();
        p.set("k", Bytes::from_static(b"\x00\x01raw\xff"), 1, Duration::ZERO)
            .await
            .unwrap();

        let got = p.get("k").await.unwrap();
        assert_eq!(got, Some(Bytes::from_static(b"\x00\x01raw\xff")));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let p = MemoryProvider::new();
        assert_eq!(p.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_means_no_expiry() {
        let p = MemoryProvider::new();
        p.set("k", Bytes::from_static(b"v"), 1, Duration::ZERO)
            .await
            .unwrap();
        assert!(p.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_dropped_on_read() {
        let p = MemoryProvider::new();
        p.set("k", Bytes::from_static(b"v"), 1, Duration::from_millis(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(p.get("k").await.unwrap(), None);
        assert_eq!(p.len(), 0);
        assert_eq!(p.total_bytes(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_accounting() {
        let p = MemoryProvider::new();
        p.set("a", Bytes::from_static(b"12345"), 1, Duration::ZERO)
            .await
            .unwrap();
        p.set("b", Bytes::from_static(b"123"), 1, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.total_bytes(), 8);

        p.delete("a").await.unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.total_bytes(), 3);

        // Deleting an absent key is a no-op.
        p.delete("absent").await.unwrap();
        assert_eq!(p.len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_updates_accounting() {
        let p = MemoryProvider::new();
        p.set("k", Bytes::from_static(b"long-value"), 1, Duration::ZERO)
            .await
            .unwrap();
        p.set("k", Bytes::from_static(b"v"), 1, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.total_bytes(), 1);
    }

    #[tokio::test]
    async fn test_contains_prefix() {
        let p = MemoryProvider::new();
        p.set("single:user:a", Bytes::from_static(b"v"), 1, Duration::ZERO)
            .await
            .unwrap();
        assert!(p.contains_prefix("single:user:"));
        assert!(!p.contains_prefix("bulk:user:"));
    }
}
