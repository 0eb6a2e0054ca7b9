//! Observability Hooks
//!
//! Lightweight callbacks for high-signal cache events. Hooks are called
//! synchronously on the caller's task and MUST be cheap and non-blocking; do
//! not perform I/O in them. If work may block, wrap the hook set in
//! [`AsyncHooks`], which buffers events and drops on backpressure instead of
//! stalling the hot path.

mod async_queue;
mod log;

pub use async_queue::AsyncHooks;
pub use log::{TracingHooks, TracingHooksConfig};

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// Why a single entry was deleted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealReason {
    /// Wire frame failed strict validation
    Corrupt,
    /// Embedded generation no longer current
    GenMismatch,
    /// User codec rejected the payload
    ValueDecode,
}

impl fmt::Display for HealReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealReason::Corrupt => write!(f, "corrupt"),
            HealReason::GenMismatch => write!(f, "gen_mismatch"),
            HealReason::ValueDecode => write!(f, "value_decode"),
        }
    }
}

/// Why a bulk entry was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkRejectReason {
    /// Wire frame failed strict validation
    DecodeError,
    /// A requested member was missing or stale
    InvalidOrStale,
    /// A writer's observed generation was no longer current
    GenMismatch,
}

impl fmt::Display for BulkRejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkRejectReason::DecodeError => write!(f, "decode_error"),
            BulkRejectReason::InvalidOrStale => write!(f, "invalid_or_stale"),
            BulkRejectReason::GenMismatch => write!(f, "gen_mismatch"),
        }
    }
}

/// Event callbacks. Every method has a no-op default, so implementations
/// override only what they observe.
pub trait Hooks: Send + Sync {
    /// A single entry was deleted during a read.
    fn self_heal_single(&self, _storage_key: &str, _reason: HealReason) {}

    /// A bulk entry was discarded; `requested` is the size of the unique
    /// requested set.
    fn bulk_rejected(&self, _namespace: &str, _requested: usize, _reason: BulkRejectReason) {}

    /// The value store refused a write under pressure.
    fn provider_set_rejected(&self, _storage_key: &str, _is_bulk: bool) {}

    /// A generation snapshot failed; the engine degraded conservatively.
    fn gen_snapshot_error(&self, _count: usize, _error: &Error) {}

    /// A generation bump failed during invalidate.
    fn gen_bump_error(&self, _storage_key: &str, _error: &Error) {}

    /// Both halves of an invalidate failed.
    fn invalidate_outage(&self, _key: &str, _bump_error: &Error, _delete_error: &Error) {}

    /// Bulk entries are enabled while generations are in-process only;
    /// stale bulks are possible across replicas.
    fn local_gen_with_bulk(&self) {}
}

/// Default no-op hook set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopHooks;

impl Hooks for NopHooks {}

/// Fans every event out to all inner hooks, in order.
pub struct MultiHooks {
    inner: Vec<Arc<dyn Hooks>>,
}

impl MultiHooks {
    pub fn new(hooks: Vec<Arc<dyn Hooks>>) -> Self {
        Self { inner: hooks }
    }
}

impl Hooks for MultiHooks {
    fn self_heal_single(&self, storage_key: &str, reason: HealReason) {
        for h in &self.inner {
            h.self_heal_single(storage_key, reason);
        }
    }

    fn bulk_rejected(&self, namespace: &str, requested: usize, reason: BulkRejectReason) {
        for h in &self.inner {
            h.bulk_rejected(namespace, requested, reason);
        }
    }

    fn provider_set_rejected(&self, storage_key: &str, is_bulk: bool) {
        for h in &self.inner {
            h.provider_set_rejected(storage_key, is_bulk);
        }
    }

    fn gen_snapshot_error(&self, count: usize, error: &Error) {
        for h in &self.inner {
            h.gen_snapshot_error(count, error);
        }
    }

    fn gen_bump_error(&self, storage_key: &str, error: &Error) {
        for h in &self.inner {
            h.gen_bump_error(storage_key, error);
        }
    }

    fn invalidate_outage(&self, key: &str, bump_error: &Error, delete_error: &Error) {
        for h in &self.inner {
            h.invalidate_outage(key, bump_error, delete_error);
        }
    }

    fn local_gen_with_bulk(&self) {
        for h in &self.inner {
            h.local_gen_with_bulk();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
