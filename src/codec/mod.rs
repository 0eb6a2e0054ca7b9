//! Value Codec Port
//!
//! A [`Codec`] converts the caller's value type to and from bytes. Encode and
//! decode must be pure functions of their input and must round-trip for any
//! value produced by a successful encode. Malformed input is an error, never
//! a panic.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Encodes and decodes a value of type `V` to and from a byte slice.
pub trait Codec<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<Vec<u8>>;
    fn decode(&self, payload: &[u8]) -> Result<V>;
}

/// Codec serializing values as JSON via `serde_json`.
///
/// The unit value is ready to use and respects `serde` struct attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl<V> Codec<V> for Json
where
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::ValueEncode(e.into()))
    }

    fn decode(&self, payload: &[u8]) -> Result<V> {
        serde_json::from_slice(payload).map_err(|e| Error::ValueDecode(e.into()))
    }
}

/// Identity codec for raw byte values. Useful when the value type is already
/// a byte buffer and only the wire framing and CAS validation are needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl Codec<Vec<u8>> for Raw {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }
}

/// Codec for `String` values. Decode validates UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl Codec<String> for Utf8 {
    fn encode(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.clone().into_bytes())
    }

    fn decode(&self, payload: &[u8]) -> Result<String> {
        String::from_utf8(payload.to_vec()).map_err(|e| Error::ValueDecode(e.into()))
    }
}

/// Wraps another codec to enforce a maximum payload size at decode time.
/// Encode is forwarded unchanged. A `max_decode` of 0 disables the limit.
///
/// Typical use: protect against oversized inputs coming from a shared cache
/// that other writers can reach.
#[derive(Debug, Clone, Copy)]
pub struct Limit<C> {
    inner: C,
    max_decode: usize,
}

impl<C> Limit<C> {
    pub fn new(inner: C, max_decode: usize) -> Self {
        Self { inner, max_decode }
    }
}

impl<V, C> Codec<V> for Limit<C>
where
    C: Codec<V>,
{
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        self.inner.encode(value)
    }

    fn decode(&self, payload: &[u8]) -> Result<V> {
        if self.max_decode > 0 && payload.len() > self.max_decode {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.max_decode,
            });
        }
        self.inner.decode(payload)
    }
}

// =============================================================================
// Tests
// =============================================================================
