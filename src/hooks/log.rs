//! Hooks adapter that logs events through `tracing`.
//!
//! Self-heal and bulk-reject events can flood under sustained corruption, so
//! both support sampling. Storage keys may embed user identifiers; they are
//! redacted before logging (SHA-256 prefix by default).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use super::{BulkRejectReason, HealReason, Hooks};
use crate::error::Error;

/// Key redaction function.
pub type RedactFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Tuning for [`TracingHooks`].
#[derive(Clone, Default)]
pub struct TracingHooksConfig {
    /// Log every Nth self-heal; 0 or 1 logs all.
    pub self_heal_every: u64,
    /// Log every Nth bulk rejection; 0 or 1 logs all.
    pub bulk_reject_every: u64,
    /// Optional key redactor; defaults to a SHA-256 prefix.
    pub redact: Option<RedactFn>,
}

/// Hook set emitting `tracing` events.
pub struct TracingHooks {
    config: TracingHooksConfig,
    self_heal_ctr: AtomicU64,
    bulk_reject_ctr: AtomicU64,
}

impl TracingHooks {
    pub fn new(config: TracingHooksConfig) -> Self {
        Self {
            config,
            self_heal_ctr: AtomicU64::new(0),
            bulk_reject_ctr: AtomicU64::new(0),
        }
    }

    fn redact(&self, key: &str) -> String {
        if let Some(redact) = &self.config.redact {
            return redact(key);
        }
        let sum = Sha256::digest(key.as_bytes());
        hex::encode(&sum[..8])
    }

    fn sample(every: u64, ctr: &AtomicU64) -> bool {
        if every <= 1 {
            return true;
        }
        (ctr.fetch_add(1, Ordering::Relaxed) + 1) % every == 0
    }
}

impl Hooks for TracingHooks {
    fn self_heal_single(&self, storage_key: &str, reason: HealReason) {
        if !Self::sample(self.config.self_heal_every, &self.self_heal_ctr) {
            return;
        }
        debug!(
            key = %self.redact(storage_key),
            reason = %reason,
            "cascache self_heal_single"
        );
    }

    fn bulk_rejected(&self, namespace: &str, requested: usize, reason: BulkRejectReason) {
        if !Self::sample(self.config.bulk_reject_every, &self.bulk_reject_ctr) {
            return;
        }
        info!(
            ns = namespace,
            requested,
            reason = %reason,
            "cascache bulk_rejected"
        );
    }

    fn provider_set_rejected(&self, storage_key: &str, is_bulk: bool) {
        warn!(
            key = %self.redact(storage_key),
            is_bulk,
            "cascache provider_set_rejected"
        );
    }

    fn gen_snapshot_error(&self, count: usize, error: &Error) {
        warn!(count, err = %error, "cascache gen_snapshot_error");
    }

    fn gen_bump_error(&self, storage_key: &str, error: &Error) {
        warn!(
            key = %self.redact(storage_key),
            err = %error,
            "cascache gen_bump_error"
        );
    }

    fn invalidate_outage(&self, key: &str, bump_error: &Error, delete_error: &Error) {
        error!(
            key = %self.redact(key),
            bump_err = %bump_error,
            del_err = %delete_error,
            "cascache invalidate_outage"
        );
    }

    fn local_gen_with_bulk(&self) {
        warn!("cascache bulk enabled with local generations; stale bulks possible in multi-replica");
    }
}

// =============================================================================
// Tests
// =============================================================================
