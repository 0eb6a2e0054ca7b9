//! Bounded async queue around a hook set.
//!
//! Events are enqueued with a non-blocking send and delivered to the inner
//! hooks by a small worker pool. When the queue is full, events are dropped;
//! the hot path never blocks on observability.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BulkRejectReason, HealReason, Hooks};
use crate::error::Error;

enum HookEvent {
    SelfHealSingle {
        storage_key: String,
        reason: HealReason,
    },
    BulkRejected {
        namespace: String,
        requested: usize,
        reason: BulkRejectReason,
    },
    ProviderSetRejected {
        storage_key: String,
        is_bulk: bool,
    },
    GenSnapshotError {
        count: usize,
        error: String,
    },
    GenBumpError {
        storage_key: String,
        error: String,
    },
    InvalidateOutage {
        key: String,
        bump_error: String,
        delete_error: String,
    },
    LocalGenWithBulk,
}

fn deliver(inner: &dyn Hooks, event: HookEvent) {
    match event {
        HookEvent::SelfHealSingle {
            storage_key,
            reason,
        } => inner.self_heal_single(&storage_key, reason),
        HookEvent::BulkRejected {
            namespace,
            requested,
            reason,
        } => inner.bulk_rejected(&namespace, requested, reason),
        HookEvent::ProviderSetRejected {
            storage_key,
            is_bulk,
        } => inner.provider_set_rejected(&storage_key, is_bulk),
        HookEvent::GenSnapshotError { count, error } => {
            inner.gen_snapshot_error(count, &Error::transport(error));
        }
        HookEvent::GenBumpError { storage_key, error } => {
            inner.gen_bump_error(&storage_key, &Error::transport(error));
        }
        HookEvent::InvalidateOutage {
            key,
            bump_error,
            delete_error,
        } => inner.invalidate_outage(
            &key,
            &Error::transport(bump_error),
            &Error::transport(delete_error),
        ),
        HookEvent::LocalGenWithBulk => inner.local_gen_with_bulk(),
    }
}

/// Buffers hook events in a bounded queue drained by worker tasks.
///
/// Errors cross the queue as their display form; inner hooks receive them
/// re-wrapped as transport errors. [`close`](AsyncHooks::close) drains the
/// queue and is safe to call more than once; events emitted after close are
/// dropped.
pub struct AsyncHooks {
    tx: Mutex<Option<mpsc::Sender<HookEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncHooks {
    /// Wrap `inner` with `workers` delivery tasks and a queue of `queue_len`
    /// events. Both are clamped to at least 1. Must be called inside a Tokio
    /// runtime.
    pub fn new(inner: Arc<dyn Hooks>, workers: usize, queue_len: usize) -> Self {
        let workers = workers.max(1);
        let queue_len = queue_len.max(1);

        let (tx, rx) = mpsc::channel::<HookEvent>(queue_len);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = rx.clone();
            let inner = inner.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let event = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match event {
                        Some(event) => deliver(inner.as_ref(), event),
                        None => break,
                    }
                }
            }));
        }

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    fn try_send(&self, event: HookEvent) {
        if let Some(tx) = self.tx.lock().as_ref() {
            // Full queue or closed channel: drop the event.
            let _ = tx.try_send(event);
        }
    }

    /// Stop accepting events, drain the queue, and wait for the workers.
    pub async fn close(&self) {
        let tx = self.tx.lock().take();
        drop(tx);

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Hooks for AsyncHooks {
    fn self_heal_single(&self, storage_key: &str, reason: HealReason) {
        self.try_send(HookEvent::SelfHealSingle {
            storage_key: storage_key.to_string(),
            reason,
        });
    }

    fn bulk_rejected(&self, namespace: &str, requested: usize, reason: BulkRejectReason) {
        self.try_send(HookEvent::BulkRejected {
            namespace: namespace.to_string(),
            requested,
            reason,
        });
    }

    fn provider_set_rejected(&self, storage_key: &str, is_bulk: bool) {
        self.try_send(HookEvent::ProviderSetRejected {
            storage_key: storage_key.to_string(),
            is_bulk,
        });
    }

    fn gen_snapshot_error(&self, count: usize, error: &Error) {
        self.try_send(HookEvent::GenSnapshotError {
            count,
            error: error.to_string(),
        });
    }

    fn gen_bump_error(&self, storage_key: &str, error: &Error) {
        self.try_send(HookEvent::GenBumpError {
            storage_key: storage_key.to_string(),
            error: error.to_string(),
        });
    }

    fn invalidate_outage(&self, key: &str, bump_error: &Error, delete_error: &Error) {
        self.try_send(HookEvent::InvalidateOutage {
            key: key.to_string(),
            bump_error: bump_error.to_string(),
            delete_error: delete_error.to_string(),
        });
    }

    fn local_gen_with_bulk(&self) {
        self.try_send(HookEvent::LocalGenWithBulk);
    }
}

// =============================================================================
// Tests
// =============================================================================
