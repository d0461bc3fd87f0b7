// ── Core error types ──
//
// User-facing errors from statesync-core. Consumers never see raw store
// errors directly; the `From<statesync_api::Error>` impl folds them into
// `Transport` or `Config`.

use thiserror::Error;

use crate::codec::{DecodeError, EncodeError};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Codec errors ─────────────────────────────────────────────────
    /// A raw key or value from the store could not be decoded.
    ///
    /// Adapters log and skip these per entry; callers only see them from
    /// direct reads.
    #[error("Cannot decode entry '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("Cannot encode value: {reason}")]
    Encode { reason: String },

    /// A domain key encoded to something that is not a legal path segment.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    // ── Transport errors (wrapped, not exposed raw) ──────────────────
    #[error("Remote store error: {message}")]
    Transport {
        message: String,
        /// Whether retrying the same operation might succeed.
        transient: bool,
    },

    // ── State errors ─────────────────────────────────────────────────
    /// The adapter (or its connection) has been closed.
    #[error("Cannot {operation}: adapter is closed")]
    Closed { operation: &'static str },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` if presentation should offer a retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                transient: true,
                ..
            }
        )
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl CoreError {
    /// Attach the raw key (or path) a decode failure belongs to.
    pub fn decode(key: impl Into<String>, err: DecodeError) -> Self {
        Self::Decode {
            key: key.into(),
            reason: err.reason().to_owned(),
        }
    }
}

impl From<EncodeError> for CoreError {
    fn from(err: EncodeError) -> Self {
        Self::Encode {
            reason: err.reason().to_owned(),
        }
    }
}

impl From<statesync_api::Error> for CoreError {
    fn from(err: statesync_api::Error) -> Self {
        match err {
            statesync_api::Error::InvalidPath { path, reason } => CoreError::Config {
                message: format!("invalid path '{path}': {reason}"),
            },
            other => CoreError::Transport {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}
