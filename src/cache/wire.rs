//! Wire Format - Versioned Binary Envelope
//!
//! The compact, versioned on-the-wire format used to store values in the
//! underlying [`Provider`](crate::provider::Provider). Provides zero-copy
//! decoders and pre-sized encoders for both single entries and bulk entries.
//!
//! # Design
//!
//! - All integers are big-endian (network byte order)
//! - A 4-byte ASCII magic (`CASC`) allows quick format discrimination
//! - A 1-byte version enables forward/backward compatibility in place
//! - The kind byte distinguishes single vs bulk payloads
//! - The payload after the fixed header is codec-opaque bytes
//! - Decoders are bounds-safe: every slice operation is preceded by a length
//!   check; on any mismatch they return [`Error::Corrupt`]
//! - Decoded payloads are [`Bytes`] slices of the input buffer (zero-copy).
//!   Holding any slice keeps the backing buffer alive; callers that need to
//!   retain or mutate a payload beyond the frame's lifetime must copy
//! - Bulk decode allocates exactly one `String` per item to materialize the
//!   key (stable map key semantics)
//!
//! # Strict framing
//!
//! Decoders require that a frame consume the entire buffer. Trailing bytes
//! are treated as corruption from a foreign writer and rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Fixed 4-byte magic header.
const MAGIC: [u8; 4] = *b"CASC";

/// Wire-format version. Bump only on incompatible layout changes.
const VERSION: u8 = 1;

const KIND_SINGLE: u8 = 1;
const KIND_BULK: u8 = 2;

/// magic(4) | ver(1) | kind(1) | gen(8) | vlen(4)
const SINGLE_HEADER: usize = 4 + 1 + 1 + 8 + 4;

/// magic(4) | ver(1) | kind(1) | n(4)
const BULK_HEADER: usize = 4 + 1 + 1 + 4;

/// Minimal per-item footprint: klen(2) + key(1) + gen(8) + vlen(4), payload
/// may be empty. Used to bound preallocation against a forged item count.
const MIN_BULK_ITEM: usize = 2 + 1 + 8 + 4;

/// One member of a bulk-encoded set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireItem {
    /// Member user key
    pub key: String,
    /// Generation the member was written at
    pub gen: u64,
    /// Codec-encoded value (zero-copy view after decode)
    pub payload: Bytes,
}

fn has_magic(b: &[u8]) -> bool {
    b.len() >= 4 && b[..4] == MAGIC
}

/// Encode a single entry.
///
/// Layout (big-endian):
///
/// ```text
/// magic(4) | ver(1) | kind(1=single) | gen(u64) | vlen(u32) | payload(vlen)
/// ```
///
/// The payload is the codec-encoded value; `gen` is the per-key generation
/// used for read-side CAS validation. The buffer is sized exactly once.
pub fn encode_single(gen: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(SINGLE_HEADER + payload.len());
    buf.put_slice(&MAGIC);
    buf.put_u8(VERSION);
    buf.put_u8(KIND_SINGLE);
    buf.put_u64(gen);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Decode a single entry into `(gen, payload)`.
///
/// The returned payload is a zero-copy slice of `buf` and must be treated as
/// read-only.
pub fn decode_single(buf: &Bytes) -> Result<(u64, Bytes)> {
    if buf.len() < SINGLE_HEADER
        || !has_magic(buf)
        || buf[4] != VERSION
        || buf[5] != KIND_SINGLE
    {
        return Err(Error::Corrupt);
    }

    let mut cursor = &buf[6..];
    let gen = cursor.get_u64();
    let vlen = cursor.get_u32() as usize;

    // No trailing bytes allowed.
    if SINGLE_HEADER + vlen != buf.len() {
        return Err(Error::Corrupt);
    }
    Ok((gen, buf.slice(SINGLE_HEADER..)))
}

/// Encode a bulk set of items into a single value.
///
/// Layout (big-endian):
///
/// ```text
/// magic(4) | ver(1) | kind(1=bulk) | n(u32)
/// repeated n times:
///   keyLen(u16) | key(keyLen) | gen(u64) | vlen(u32) | payload(vlen)
/// ```
///
/// Items are written in the caller-supplied order. Returns
/// [`Error::InvalidKeyLength`] if any key is empty or longer than 65535
/// bytes.
pub fn encode_bulk(items: &[WireItem]) -> Result<Bytes> {
    let mut total = BULK_HEADER;
    for it in items {
        let klen = it.key.len();
        if klen == 0 || klen > usize::from(u16::MAX) {
            return Err(Error::InvalidKeyLength(klen));
        }
        total += 2 + klen + 8 + 4 + it.payload.len();
    }

    let mut buf = BytesMut::with_capacity(total);
    buf.put_slice(&MAGIC);
    buf.put_u8(VERSION);
    buf.put_u8(KIND_BULK);
    buf.put_u32(items.len() as u32);

    for it in items {
        buf.put_u16(it.key.len() as u16);
        buf.put_slice(it.key.as_bytes());
        buf.put_u64(it.gen);
        buf.put_u32(it.payload.len() as u32);
        buf.put_slice(&it.payload);
    }
    Ok(buf.freeze())
}

/// Decode a bulk entry into its items.
///
/// Each item's payload is a zero-copy slice of `buf`; the key is materialized
/// as an owned `String` (one allocation per item). Duplicate keys in the
/// stored items are allowed and preserved in order; when the result is used
/// as a lookup, the last occurrence wins.
pub fn decode_bulk(buf: &Bytes) -> Result<Vec<WireItem>> {
    if buf.len() < BULK_HEADER || !has_magic(buf) || buf[4] != VERSION || buf[5] != KIND_BULK {
        return Err(Error::Corrupt);
    }

    let mut cursor = &buf[6..];
    let n = cursor.get_u32() as usize;
    let mut off = BULK_HEADER;

    // Bound preallocation by what the buffer could plausibly contain so a
    // forged n cannot trigger an adversarial allocation.
    let plausible = buf.len().saturating_sub(off) / MIN_BULK_ITEM;
    let mut items = Vec::with_capacity(n.min(plausible));

    for _ in 0..n {
        if off + 2 > buf.len() {
            return Err(Error::Corrupt);
        }
        let klen = usize::from(u16::from_be_bytes([buf[off], buf[off + 1]]));
        off += 2;
        if klen == 0 || klen > buf.len() - off {
            return Err(Error::Corrupt);
        }

        let key = match std::str::from_utf8(&buf[off..off + klen]) {
            Ok(s) => s.to_owned(),
            Err(_) => return Err(Error::Corrupt),
        };
        off += klen;

        if off + 8 > buf.len() {
            return Err(Error::Corrupt);
        }
        let gen = u64::from_be_bytes([
            buf[off],
            buf[off + 1],
            buf[off + 2],
            buf[off + 3],
            buf[off + 4],
            buf[off + 5],
            buf[off + 6],
            buf[off + 7],
        ]);
        off += 8;

        if off + 4 > buf.len() {
            return Err(Error::Corrupt);
        }
        let vlen =
            u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]) as usize;
        off += 4;
        if vlen > buf.len() - off {
            return Err(Error::Corrupt);
        }

        let payload = buf.slice(off..off + vlen);
        off += vlen;

        items.push(WireItem { key, gen, payload });
    }

    // The frame must consume the entire buffer.
    if off != buf.len() {
        return Err(Error::Corrupt);
    }
    Ok(items)
}

// =============================================================================
// Tests
// =============================================================================
