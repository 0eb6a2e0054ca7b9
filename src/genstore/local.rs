//! In-process generation store.
//!
//! Generations live in a single map behind a readers-writer lock. Snapshots
//! take the shared lock; bumps take the exclusive lock and record the bump
//! time. An optional background sweeper prunes keys whose generation has not
//! been bumped for at least the retention period, bounding memory for
//! long-inactive keys. A pruned key reads as generation 0 again, which the
//! cache layer absorbs: readers self-heal and stale writers skip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use super::GenStore;
use crate::error::Result;

/// Per-key generation and the time of the last bump.
///
/// `updated_at` is set only on bumps; reads never touch timestamps, which
/// avoids write amplification on hot read paths.
struct GenEntry {
    gen: u64,
    updated_at: Instant,
}

struct Sweeper {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Generation store keeping counters in-process (no network I/O).
///
/// When both `cleanup_interval` and `retention` are positive, a background
/// task runs [`cleanup`](GenStore::cleanup) every interval. Construction must
/// then happen inside a Tokio runtime. With either duration zero, no
/// background task runs and `cleanup` may be called manually.
pub struct LocalGenStore {
    gens: RwLock<HashMap<String, GenEntry>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl LocalGenStore {
    /// Construct a store, optionally spawning the retention sweeper.
    pub fn new(cleanup_interval: Duration, retention: Duration) -> Arc<Self> {
        let store = Arc::new(Self {
            gens: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
        });

        if cleanup_interval > Duration::ZERO && retention > Duration::ZERO {
            let stop = Arc::new(Notify::new());
            let stop_rx = stop.clone();
            let weak = Arc::downgrade(&store);

            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(cleanup_interval);
                // The first tick of a tokio interval fires immediately.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let Some(store) = weak.upgrade() else { break };
                            store.cleanup(retention);
                        }
                        _ = stop_rx.notified() => break,
                    }
                }
            });

            *store.sweeper.lock() = Some(Sweeper { stop, task });
        }
        store
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.gens.read().len()
    }

    /// True when no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.gens.read().is_empty()
    }
}

#[async_trait]
impl GenStore for LocalGenStore {
    async fn snapshot(&self, storage_key: &str) -> Result<u64> {
        Ok(self.gens.read().get(storage_key).map_or(0, |e| e.gen))
    }

    async fn snapshot_many(&self, storage_keys: &[String]) -> Result<HashMap<String, u64>> {
        // One shared-lock acquisition for the whole batch.
        let gens = self.gens.read();
        let mut out = HashMap::with_capacity(storage_keys.len());
        for k in storage_keys {
            out.insert(k.clone(), gens.get(k).map_or(0, |e| e.gen));
        }
        Ok(out)
    }

    async fn bump(&self, storage_key: &str) -> Result<u64> {
        let now = Instant::now();
        let mut gens = self.gens.write();
        let entry = gens.entry(storage_key.to_string()).or_insert(GenEntry {
            gen: 0,
            updated_at: now,
        });
        entry.gen += 1;
        entry.updated_at = now;
        Ok(entry.gen)
    }

    fn cleanup(&self, retention: Duration) {
        if retention == Duration::ZERO {
            return;
        }
        let now = Instant::now();

        let mut gens = self.gens.write();
        let before = gens.len();
        gens.retain(|_, e| now.duration_since(e.updated_at) <= retention);
        let removed = before - gens.len();

        if removed > 0 {
            debug!(removed, "generation cleanup removed stale entries");
        }
    }

    async fn close(&self) -> Result<()> {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop.notify_one();
            let _ = sweeper.task.await;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unswept() -> Arc<LocalGenStore> {
        LocalGenStore::new(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_snapshot_missing_is_zero() {
        let s = unswept();
        assert_eq!(s.snapshot("never-bumped").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bump_is_monotonic() {
        let s = unswept();
        assert_eq!(s.bump("k").await.unwrap(), 1);
        assert_eq!(s.bump("k").await.unwrap(), 2);
        assert_eq!(s.bump("k").await.unwrap(), 3);
        assert_eq!(s.snapshot("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bump_isolated_per_key() {
        let s = unswept();
        s.bump("a").await.unwrap();
        assert_eq!(s.snapshot("a").await.unwrap(), 1);
        assert_eq!(s.snapshot("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_many_missing_map_to_zero() {
        let s = unswept();
        s.bump("m1").await.unwrap();
        for _ in 0..3 {
            s.bump("m3").await.unwrap();
        }

        let keys = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
        let got = s.snapshot_many(&keys).await.unwrap();
        assert_eq!(got["m1"], 1);
        assert_eq!(got["m2"], 0);
        assert_eq!(got["m3"], 3);
    }

    #[tokio::test]
    async fn test_concurrent_bumps_never_lose_increments() {
        let s = unswept();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let s = s.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    s.bump("hot").await.unwrap();
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(s.snapshot("hot").await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_cleanup_prunes_only_old_entries() {
        let s = unswept();
        s.bump("old").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        s.bump("fresh").await.unwrap();

        s.cleanup(Duration::from_millis(20));

        assert_eq!(s.snapshot("old").await.unwrap(), 0);
        assert_eq!(s.snapshot("fresh").await.unwrap(), 1);
        assert_eq!(s.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_zero_retention_is_disabled() {
        let s = unswept();
        s.bump("k").await.unwrap();
        s.cleanup(Duration::ZERO);
        assert_eq!(s.snapshot("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_background_sweeper_prunes() {
        let s = LocalGenStore::new(Duration::from_millis(20), Duration::from_millis(10));
        s.bump("k").await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(s.snapshot("k").await.unwrap(), 0);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let s = LocalGenStore::new(Duration::from_millis(50), Duration::from_secs(60));
        s.close().await.unwrap();
        s.close().await.unwrap();

        // The store keeps serving after close; only the sweeper stops.
        assert_eq!(s.bump("k").await.unwrap(), 1);
    }
}
