//! Storage-key derivation.
//!
//! The engine owns the `single:<ns>:` and `bulk:<ns>:` prefixes in the value
//! store. Bulk keys are a canonical hash over the unique, sorted member keys,
//! so the same set always maps to the same storage key regardless of request
//! order or duplicates.

use sha2::{Digest, Sha256};

/// Storage key for a single entry: `single:<ns>:<user_key>`.
pub fn single_key(namespace: &str, user_key: &str) -> String {
    format!("single:{namespace}:{user_key}")
}

/// Canonical storage key for a bulk entry: `bulk:<ns>:<hash16>`.
///
/// `sorted_keys` must already be deduplicated and sorted ascending. Each key
/// is length-prefixed (u32 big-endian) before hashing, which makes the
/// derivation injective over sets: distinct sets cannot collide by
/// concatenation.
pub fn bulk_key_sorted(namespace: &str, sorted_keys: &[String]) -> String {
    let total: usize = sorted_keys.iter().map(|k| 4 + k.len()).sum();
    let mut buf = Vec::with_capacity(total);
    for k in sorted_keys {
        buf.extend_from_slice(&(k.len() as u32).to_be_bytes());
        buf.extend_from_slice(k.as_bytes());
    }

    let sum = Sha256::digest(&buf);
    // First 8 bytes -> 16 hex chars.
    format!("bulk:{namespace}:{}", hex::encode(&sum[..8]))
}

/// Deduplicate and sort a caller-supplied key list into canonical form.
pub fn unique_sorted(keys: &[String]) -> Vec<String> {
    let mut out: Vec<String> = keys.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_single_key_namespacing() {
        assert_eq!(single_key("user", "u:1"), "single:user:u:1");
        assert_ne!(single_key("user", "k"), single_key("order", "k"));
    }

    #[test]
    fn test_bulk_key_order_and_duplicate_insensitive() {
        let a = bulk_key_sorted("user", &unique_sorted(&keys(&["u3", "u1", "u4"])));
        let b = bulk_key_sorted("user", &unique_sorted(&keys(&["u1", "u3", "u3", "u4"])));
        assert_eq!(a, b);
    }

    #[test]
    fn test_bulk_key_distinct_sets_differ() {
        let a = bulk_key_sorted("user", &keys(&["u1", "u2"]));
        let b = bulk_key_sorted("user", &keys(&["u1", "u3"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_bulk_key_length_prefix_defeats_concatenation() {
        // Without length prefixes these two sets would hash identically.
        let a = bulk_key_sorted("user", &keys(&["ab", "c"]));
        let b = bulk_key_sorted("user", &keys(&["a", "bc"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_bulk_key_shape() {
        let k = bulk_key_sorted("user", &keys(&["u1"]));
        let suffix = k.strip_prefix("bulk:user:").unwrap();
        assert_eq!(suffix.len(), 16);
        assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_bulk_key_namespace_isolation() {
        let a = bulk_key_sorted("user", &keys(&["u1"]));
        let b = bulk_key_sorted("order", &keys(&["u1"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_unique_sorted() {
        let got = unique_sorted(&keys(&["b", "a", "b", "c", "a"]));
        assert_eq!(got, keys(&["a", "b", "c"]));
        assert!(unique_sorted(&[]).is_empty());
    }
}
