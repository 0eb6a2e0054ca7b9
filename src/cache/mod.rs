//! Cache Orchestrator - CAS-Guarded Read/Write Protocols
//!
//! Composes the value store, the value codec, and the generation store into a
//! cache whose reads are compare-and-swap safe: after a successful
//! invalidation, no reader observes the previous cached value, regardless of
//! races between writers, readers, replicas, or TTL expirations.
//!
//! # Protocol
//!
//! Every stored entry carries the generation its writer observed. Reads
//! re-snapshot the current generation and reject entries whose embedded
//! generation is no longer current, deleting them on the way out
//! (self-heal). Writes snapshot first and skip silently when the generation
//! has moved. Invalidation bumps the generation and deletes the entry; either
//! half alone is enough to keep readers from ever returning the old value.
//!
//! ```text
//!       Cold (no entry) ──set_with_gen(CAS ok)──► Warm@gen=G
//!       Warm@gen=G ──invalidate(bump→G+1, delete)──► Cold
//!       Warm@gen=G ──get(G == current)──► value
//!       set_with_gen(old G) ──► skipped
//! ```
//!
//! Bulk entries mirror the single protocol but validate member-by-member
//! against a batched snapshot; one stale member rejects the whole entry.
//!
//! Cancellation is cooperative: drop an operation's future (or wrap it in
//! `tokio::time::timeout`) to abort the in-flight store call. A cancelled
//! operation never leaves a value observable that was not fully validated.

mod keys;
mod wire;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::codec::Codec;
use crate::error::{Error, InvalidateOutage, Result};
use crate::genstore::{GenStore, LocalGenStore};
use crate::hooks::{BulkRejectReason, HealReason, Hooks, NopHooks};
use crate::provider::Provider;

/// Advisory cost hint for provider writes:
/// `(storage_key, frame_bytes, is_bulk, member_count) -> cost`.
pub type SetCostFn = Arc<dyn Fn(&str, &[u8], bool, usize) -> i64 + Send + Sync>;

const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_BULK_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_GEN_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Tuning for [`CasCache`]. Zero durations fall back to the defaults.
#[derive(Clone, Default)]
pub struct CacheConfig {
    /// TTL for single entries when the caller passes zero; default 10 min.
    pub default_ttl: Duration,
    /// TTL for bulk entries when the caller passes zero; default 10 min.
    pub bulk_ttl: Duration,
    /// Local generation sweep interval; default 1 h.
    pub cleanup_interval: Duration,
    /// Local generation retention; default 30 d.
    pub gen_retention: Duration,
    /// No-op mode: every operation succeeds as a miss or skip.
    pub disabled: bool,
    /// Force the singles path for `get_bulk`/`set_bulk_with_gens`.
    pub disable_bulk: bool,
    /// Advisory cost hint passed to the provider; default cost 1.
    pub compute_set_cost: Option<SetCostFn>,
    /// Where generations live; `None` selects an in-process store.
    pub gen_store: Option<Arc<dyn GenStore>>,
    /// Event callbacks; `None` selects [`NopHooks`].
    pub hooks: Option<Arc<dyn Hooks>>,
}

fn coalesce(value: Duration, default: Duration) -> Duration {
    if value == Duration::ZERO {
        default
    } else {
        value
    }
}

/// Provider-agnostic cache with CAS safety via per-key generations.
///
/// `V` is the caller's value type; serialization is handled by the pluggable
/// [`Codec`]. All operations are async and safe for concurrent use.
pub struct CasCache<V> {
    namespace: String,
    provider: Arc<dyn Provider>,
    codec: Arc<dyn Codec<V>>,
    gen: Arc<dyn GenStore>,
    hooks: Arc<dyn Hooks>,

    enabled: bool,
    bulk_enabled: bool,
    default_ttl: Duration,
    bulk_ttl: Duration,
    compute_set_cost: SetCostFn,
}

impl<V> std::fmt::Debug for CasCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasCache")
            .field("namespace", &self.namespace)
            .field("enabled", &self.enabled)
            .field("bulk_enabled", &self.bulk_enabled)
            .field("default_ttl", &self.default_ttl)
            .field("bulk_ttl", &self.bulk_ttl)
            .finish()
    }
}

impl<V> CasCache<V> {
    /// Create a cache with default configuration.
    ///
    /// Generations default to an in-process [`LocalGenStore`], so this must
    /// be called inside a Tokio runtime.
    pub fn new(
        namespace: impl Into<String>,
        provider: Arc<dyn Provider>,
        codec: Arc<dyn Codec<V>>,
    ) -> Result<Self> {
        Self::with_config(namespace, provider, codec, CacheConfig::default())
    }

    /// Create a cache with custom configuration.
    pub fn with_config(
        namespace: impl Into<String>,
        provider: Arc<dyn Provider>,
        codec: Arc<dyn Codec<V>>,
        config: CacheConfig,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(Error::Config("namespace is required".to_string()));
        }

        let cleanup_interval = coalesce(config.cleanup_interval, DEFAULT_SWEEP_INTERVAL);
        let gen_retention = coalesce(config.gen_retention, DEFAULT_GEN_RETENTION);

        let local_gens = config.gen_store.is_none();
        let gen = match config.gen_store {
            Some(gen) => gen,
            None => LocalGenStore::new(cleanup_interval, gen_retention) as Arc<dyn GenStore>,
        };
        let hooks = config.hooks.unwrap_or_else(|| Arc::new(NopHooks));

        let cache = Self {
            namespace,
            provider,
            codec,
            gen,
            hooks,
            enabled: !config.disabled,
            bulk_enabled: !config.disable_bulk,
            default_ttl: coalesce(config.default_ttl, DEFAULT_TTL),
            bulk_ttl: coalesce(config.bulk_ttl, DEFAULT_BULK_TTL),
            compute_set_cost: config
                .compute_set_cost
                .unwrap_or_else(|| Arc::new(|_, _, _, _| 1)),
        };

        // In-process generations cannot see another replica's invalidations,
        // so a replicated deployment with bulk entries can serve stale bulks.
        if cache.enabled && cache.bulk_enabled && local_gens {
            cache.hooks.local_gen_with_bulk();
        }
        Ok(cache)
    }

    /// False when the cache was constructed in no-op mode.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The namespace all storage keys are qualified with.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Release the generation store (best-effort) and the provider.
    pub async fn close(&self) -> Result<()> {
        let _ = self.gen.close().await;
        self.provider.close().await
    }

    // =========================================================================
    // Single-key protocol
    // =========================================================================

    /// Look up a single entry.
    ///
    /// Returns `Ok(None)` on miss. Corrupt, stale, or undecodable entries are
    /// deleted before returning miss (self-heal); only transport errors from
    /// the initial fetch surface to the caller.
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        if !self.enabled {
            return Ok(None);
        }
        let storage_key = self.single_key(key);
        let raw = match self.provider.get(&storage_key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let (gen, payload) = match wire::decode_single(&raw) {
            Ok(decoded) => decoded,
            Err(_) => {
                self.self_heal(&storage_key, HealReason::Corrupt).await;
                return Ok(None);
            }
        };

        if gen != self.snapshot_storage(&storage_key).await {
            self.self_heal(&storage_key, HealReason::GenMismatch).await;
            return Ok(None);
        }

        match self.codec.decode(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                self.self_heal(&storage_key, HealReason::ValueDecode).await;
                Ok(None)
            }
        }
    }

    /// Store a value iff `observed_gen` is still the key's current
    /// generation (the CAS test). A zero `ttl` selects the default single
    /// TTL.
    ///
    /// Losing the race is silent: the write is skipped and `Ok(())` is
    /// returned. Codec and provider transport errors propagate; a provider
    /// refusal under pressure does not.
    pub async fn set_with_gen(
        &self,
        key: &str,
        value: &V,
        observed_gen: u64,
        ttl: Duration,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let ttl = coalesce(ttl, self.default_ttl);
        let storage_key = self.single_key(key);

        if self.snapshot_storage(&storage_key).await != observed_gen {
            debug!(key, observed_gen, "stale write skipped (generation moved)");
            return Ok(());
        }

        let payload = self.codec.encode(value)?;
        let frame = wire::encode_single(observed_gen, &payload);
        let cost = (self.compute_set_cost)(&storage_key, &frame, false, 1);

        let stored = self.provider.set(&storage_key, frame, cost, ttl).await?;
        if !stored {
            self.hooks.provider_set_rejected(&storage_key, false);
        }
        Ok(())
    }

    /// Invalidate a key: bump its generation and delete its single entry.
    ///
    /// Either half alone guarantees no reader returns the old value, so a
    /// single failure is absorbed. Only the coupled failure of both halves
    /// escalates, as an [`InvalidateOutage`] carrying both causes.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let storage_key = self.single_key(key);

        let bumped = self.gen.bump(&storage_key).await;
        let deleted = self.provider.delete(&storage_key).await;

        match (bumped, deleted) {
            (Ok(new_gen), Ok(())) => {
                debug!(key, new_gen, "invalidated key (bumped gen + cleared single)");
                Ok(())
            }
            (Err(bump_err), Ok(())) => {
                // Delete succeeded; the next read misses regardless.
                self.hooks.gen_bump_error(&storage_key, &bump_err);
                Ok(())
            }
            (Ok(new_gen), Err(delete_err)) => {
                // Bump succeeded; a surviving entry fails read validation.
                debug!(key, new_gen, err = %delete_err, "invalidate delete failed; bump covers it");
                Ok(())
            }
            (Err(bump_err), Err(delete_err)) => {
                self.hooks.gen_bump_error(&storage_key, &bump_err);
                self.hooks.invalidate_outage(key, &bump_err, &delete_err);
                Err(Error::Invalidate(InvalidateOutage {
                    key: key.to_string(),
                    bump: Box::new(bump_err),
                    delete: Box::new(delete_err),
                }))
            }
        }
    }

    // =========================================================================
    // Bulk protocol
    // =========================================================================

    /// Look up a set of keys through the canonical bulk entry.
    ///
    /// Returns values keyed by user key plus the keys that missed, in caller
    /// order (duplicates preserved in the missing list). The bulk entry is
    /// used only when every requested member is present at its current
    /// generation; otherwise it is dropped and the lookup falls back to
    /// memoized single reads.
    pub async fn get_bulk(&self, keys: &[String]) -> Result<(HashMap<String, V>, Vec<String>)> {
        if !self.enabled {
            return Ok((HashMap::new(), keys.to_vec()));
        }
        if keys.is_empty() {
            return Ok((HashMap::new(), Vec::new()));
        }
        if !self.bulk_enabled {
            return self.get_singles(keys).await;
        }

        let unique = keys::unique_sorted(keys);
        let bulk_key = self.bulk_key_sorted(&unique);

        let raw = match self.provider.get(&bulk_key).await {
            Ok(Some(raw)) => raw,
            // Miss or transport failure: the singles path decides.
            Ok(None) | Err(_) => return self.get_singles(keys).await,
        };

        let items = match wire::decode_bulk(&raw) {
            Ok(items) => items,
            Err(_) => {
                let _ = self.provider.delete(&bulk_key).await;
                self.hooks.bulk_rejected(
                    &self.namespace,
                    unique.len(),
                    BulkRejectReason::DecodeError,
                );
                return self.get_singles(keys).await;
            }
        };

        // Duplicate stored keys: last occurrence wins.
        let mut by_key: HashMap<&str, &wire::WireItem> = HashMap::with_capacity(items.len());
        for item in &items {
            by_key.insert(item.key.as_str(), item);
        }

        let storage_keys: Vec<String> = unique.iter().map(|k| self.single_key(k)).collect();
        let snaps = self.snapshot_storage_many(&storage_keys).await;

        // Every requested member must be present at its current generation;
        // extras in the entry are ignored.
        let valid = unique.iter().zip(&storage_keys).all(|(k, sk)| {
            let current = snaps.get(sk).copied().unwrap_or(0);
            matches!(by_key.get(k.as_str()), Some(item) if item.gen == current)
        });
        if !valid {
            let _ = self.provider.delete(&bulk_key).await;
            self.hooks.bulk_rejected(
                &self.namespace,
                unique.len(),
                BulkRejectReason::InvalidOrStale,
            );
            return self.get_singles(keys).await;
        }

        // Decode the requested members and opportunistically warm their
        // singles (CAS-protected; writes that lost a race are skipped).
        let mut decoded: HashMap<String, V> = HashMap::with_capacity(unique.len());
        for k in &unique {
            let Some(item) = by_key.get(k.as_str()) else {
                continue;
            };
            match self.codec.decode(&item.payload) {
                Ok(value) => {
                    let _ = self.set_with_gen(k, &value, item.gen, self.default_ttl).await;
                    decoded.insert(k.clone(), value);
                }
                // Undecodable member: reported missing below.
                Err(_) => {}
            }
        }

        let mut out = HashMap::with_capacity(decoded.len());
        let mut missing = Vec::new();
        for k in keys {
            if out.contains_key(k) {
                continue;
            }
            match decoded.remove(k) {
                Some(value) => {
                    out.insert(k.clone(), value);
                }
                None => missing.push(k.clone()),
            }
        }
        Ok((out, missing))
    }

    /// Store a set of values as one bulk entry, iff every member's observed
    /// generation is still current. A zero `ttl` selects the default bulk
    /// TTL.
    ///
    /// Any stale member rejects the bulk write and seeds singles instead
    /// (each CAS-protected at its own observed generation). After a
    /// successful or refused bulk write, singles are seeded best-effort too,
    /// so the next single-key read is fast.
    pub async fn set_bulk_with_gens(
        &self,
        items: &HashMap<String, V>,
        observed_gens: &HashMap<String, u64>,
        ttl: Duration,
    ) -> Result<()> {
        if !self.enabled || items.is_empty() {
            return Ok(());
        }

        if !self.bulk_enabled {
            let single_ttl = coalesce(ttl, self.default_ttl);
            for (k, v) in items {
                if let Some(&obs) = observed_gens.get(k) {
                    let _ = self.set_with_gen(k, v, obs, single_ttl).await;
                }
            }
            return Ok(());
        }

        let ttl = coalesce(ttl, self.bulk_ttl);

        // Deterministic member order for both the frame and the bulk key.
        let mut sorted_keys: Vec<String> = items.keys().cloned().collect();
        sorted_keys.sort_unstable();

        let storage_keys: Vec<String> = sorted_keys.iter().map(|k| self.single_key(k)).collect();
        let snaps = self.snapshot_storage_many(&storage_keys).await;

        for (k, sk) in sorted_keys.iter().zip(&storage_keys) {
            let current = snaps.get(sk).copied().unwrap_or(0);
            match observed_gens.get(k) {
                Some(&obs) if obs == current => {}
                _ => {
                    debug!(key = %k, "bulk write skipped (generation moved); seeding singles");
                    self.hooks.bulk_rejected(
                        &self.namespace,
                        items.len(),
                        BulkRejectReason::GenMismatch,
                    );
                    self.seed_singles(items, observed_gens).await;
                    return Ok(());
                }
            }
        }

        let mut wire_items = Vec::with_capacity(sorted_keys.len());
        for k in &sorted_keys {
            let Some(value) = items.get(k) else { continue };
            let payload = self.codec.encode(value)?;
            wire_items.push(wire::WireItem {
                key: k.clone(),
                gen: observed_gens.get(k).copied().unwrap_or(0),
                payload: payload.into(),
            });
        }
        let frame = wire::encode_bulk(&wire_items)?;

        let bulk_key = self.bulk_key_sorted(&sorted_keys);
        let cost = (self.compute_set_cost)(&bulk_key, &frame, true, items.len());

        let stored = self.provider.set(&bulk_key, frame, cost, ttl).await?;
        if !stored {
            debug!(bulk_key = %bulk_key, "bulk write rejected by provider; seeding singles");
            self.hooks.provider_set_rejected(&bulk_key, true);
        }

        // Seed singles best-effort either way.
        self.seed_singles(items, observed_gens).await;
        Ok(())
    }

    // =========================================================================
    // Generation snapshots (the CAS observation API)
    // =========================================================================

    /// Current generation for a user key; missing or unreadable => 0.
    ///
    /// The canonical CAS pattern snapshots before the authoritative read and
    /// hands the observation to [`set_with_gen`](Self::set_with_gen):
    ///
    /// ```ignore
    /// let obs = cache.snapshot_gen("u1").await;
    /// let user = load_from_db("u1").await?;
    /// cache.set_with_gen("u1", &user, obs, Duration::ZERO).await?;
    /// ```
    pub async fn snapshot_gen(&self, key: &str) -> u64 {
        self.snapshot_storage(&self.single_key(key)).await
    }

    /// Batched [`snapshot_gen`](Self::snapshot_gen); duplicates collapse to
    /// one map entry.
    pub async fn snapshot_gens(&self, keys: &[String]) -> HashMap<String, u64> {
        if keys.is_empty() {
            return HashMap::new();
        }
        let storage: Vec<String> = keys.iter().map(|k| self.single_key(k)).collect();
        match self.gen.snapshot_many(&storage).await {
            Ok(snaps) => keys
                .iter()
                .zip(&storage)
                .map(|(k, sk)| (k.clone(), snaps.get(sk).copied().unwrap_or(0)))
                .collect(),
            Err(err) => {
                self.hooks.gen_snapshot_error(storage.len(), &err);
                let mut out = HashMap::with_capacity(keys.len());
                for k in keys {
                    let gen = self.snapshot_gen(k).await;
                    out.insert(k.clone(), gen);
                }
                out
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn single_key(&self, user_key: &str) -> String {
        keys::single_key(&self.namespace, user_key)
    }

    fn bulk_key_sorted(&self, sorted_keys: &[String]) -> String {
        keys::bulk_key_sorted(&self.namespace, sorted_keys)
    }

    /// Best-effort delete of an entry that failed read validation.
    async fn self_heal(&self, storage_key: &str, reason: HealReason) {
        let _ = self.provider.delete(storage_key).await;
        self.hooks.self_heal_single(storage_key, reason);
    }

    /// Snapshot a storage key's generation, degrading to 0 on error.
    /// 0 forces a miss on reads and a skip on CAS writes; never stale.
    async fn snapshot_storage(&self, storage_key: &str) -> u64 {
        match self.gen.snapshot(storage_key).await {
            Ok(gen) => gen,
            Err(err) => {
                self.hooks.gen_snapshot_error(1, &err);
                0
            }
        }
    }

    /// Batched snapshot over storage keys, falling back to per-key reads if
    /// the batch fails.
    async fn snapshot_storage_many(&self, storage_keys: &[String]) -> HashMap<String, u64> {
        match self.gen.snapshot_many(storage_keys).await {
            Ok(snaps) => snaps,
            Err(err) => {
                self.hooks.gen_snapshot_error(storage_keys.len(), &err);
                let mut out = HashMap::with_capacity(storage_keys.len());
                for k in storage_keys {
                    let gen = self.snapshot_storage(k).await;
                    out.insert(k.clone(), gen);
                }
                out
            }
        }
    }

    /// Memoized singles fallback: at most one `get` per unique key; caller
    /// order and duplicates preserved in the reassembly. Transport failures
    /// on individual reads degrade to misses.
    async fn get_singles(&self, keys: &[String]) -> Result<(HashMap<String, V>, Vec<String>)> {
        let mut memo: HashMap<String, Option<V>> = HashMap::new();
        for k in keys {
            if !memo.contains_key(k) {
                let got = self.get(k).await.ok().flatten();
                memo.insert(k.clone(), got);
            }
        }

        let mut out = HashMap::new();
        let mut missing = Vec::new();
        for k in keys {
            if out.contains_key(k) {
                continue;
            }
            match memo.get_mut(k).and_then(Option::take) {
                Some(value) => {
                    out.insert(k.clone(), value);
                }
                None => missing.push(k.clone()),
            }
        }
        Ok((out, missing))
    }

    /// Seed single entries for every member that has an observed generation,
    /// each CAS-protected and best-effort.
    async fn seed_singles(&self, items: &HashMap<String, V>, observed_gens: &HashMap<String, u64>) {
        for (k, v) in items {
            if let Some(&obs) = observed_gens.get(k) {
                let _ = self.set_with_gen(k, v, obs, self.default_ttl).await;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
