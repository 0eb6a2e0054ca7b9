//! CasCache - Provider-Agnostic Cache with Compare-and-Swap Safety
//!
//! A cache front over an arbitrary byte store with TTL, guarded by per-key
//! generation counters. Single-key reads never return stale values; bulk
//! results are validated member-by-member on read and rejected if any member
//! is stale. After a successful invalidation, no reader observes the previous
//! cached value, regardless of races between writers, readers, replicas, or
//! TTL expirations.
//!
//! # Components
//!
//! - [`Provider`] - byte store with TTL (bring your own; an in-memory
//!   reference implementation ships as [`MemoryProvider`])
//! - [`Codec`] - (de)serializes the caller's value type to and from bytes
//! - [`GenStore`] - per-key generation counters: [`LocalGenStore`]
//!   (in-process, default) or [`SharedGenStore`] (remote counter service,
//!   for multi-replica deployments and restart persistence)
//! - [`Hooks`] - lightweight callbacks for high-signal events
//!
//! # Keys
//!
//! ```text
//! single:<ns>:<key>   single entries
//! bulk:<ns>:<hash>    set-shaped entries (hash over the sorted unique keys)
//! gen:<ns>:<key>      shared generation counters
//! ```
//!
//! These prefixes belong to the engine; foreign writes under them fail strict
//! wire validation and are deleted on read.
//!
//! # The CAS pattern
//!
//! ```ignore
//! let obs = cache.snapshot_gen("u1").await;       // before the DB read
//! let user = load_from_db("u1").await?;
//! cache.set_with_gen("u1", &user, obs, Duration::ZERO).await?; // iff gen unchanged
//! ```
//!
//! # Modules
//!
//! - [`cache`] - the orchestrator and its configuration
//! - [`codec`] - value codec port and shipped codecs
//! - [`error`] - error types
//! - [`genstore`] - generation counter stores
//! - [`hooks`] - observability hooks and adapters
//! - [`provider`] - value store port and the in-memory reference store

pub mod cache;
pub mod codec;
pub mod error;
pub mod genstore;
pub mod hooks;
pub mod provider;

// Re-export commonly used types
pub use cache::{CacheConfig, CasCache, SetCostFn};
pub use codec::{Codec, Json, Limit, Raw, Utf8};
pub use error::{BoxError, Error, InvalidateOutage, Result};
pub use genstore::{CounterTransport, GenStore, LocalGenStore, SharedGenStore};
pub use hooks::{
    AsyncHooks, BulkRejectReason, HealReason, Hooks, MultiHooks, NopHooks, TracingHooks,
    TracingHooksConfig,
};
pub use provider::{MemoryProvider, Provider};
