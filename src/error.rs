//! Error types for CasCache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error from an external collaborator (provider, transport, codec).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in CasCache
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction options
    #[error("configuration error: {0}")]
    Config(String),

    /// Wire frame failed strict validation (bad magic/version/kind/lengths)
    #[error("corrupt cache entry")]
    Corrupt,

    /// Bulk key outside the encodable range [1, 65535]
    #[error("invalid bulk key length: {0}")]
    InvalidKeyLength(usize),

    /// Value codec failed to encode
    #[error("value encode failed: {0}")]
    ValueEncode(#[source] BoxError),

    /// Value codec failed to decode
    #[error("value decode failed: {0}")]
    ValueDecode(#[source] BoxError),

    /// Payload exceeds the configured decode limit
    #[error("payload too large: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// I/O or remote error from the value store or generation store
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// Both halves of an invalidation failed
    #[error(transparent)]
    Invalidate(#[from] InvalidateOutage),
}

impl Error {
    /// Wrap an arbitrary collaborator error as a transport error.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Error::Transport(err.into())
    }
}

/// Aggregate error for an invalidation where the generation bump and the
/// value-store delete both failed. Only this conjunction can leave a stale
/// window larger than TTL, so only it escalates to the caller.
///
/// Both underlying causes stay inspectable; they are never collapsed into a
/// single string.
#[derive(Error, Debug)]
#[error("invalidate {key:?} failed: gen bump and delete failed: bump={bump}; delete={delete}")]
pub struct InvalidateOutage {
    /// User key being invalidated
    pub key: String,
    /// Failure from the generation store bump
    pub bump: Box<Error>,
    /// Failure from the value store delete
    pub delete: Box<Error>,
}

impl InvalidateOutage {
    /// The generation-bump failure.
    pub fn bump_cause(&self) -> &Error {
        &self.bump
    }

    /// The value-store delete failure.
    pub fn delete_cause(&self) -> &Error {
        &self.delete
    }
}

// =============================================================================
// Tests
// =============================================================================
