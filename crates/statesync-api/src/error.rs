use thiserror::Error;

/// Top-level error type for the `statesync-api` crate.
///
/// Covers every failure a remote store can report: malformed paths,
/// an unreachable backend, and subscriptions torn down underneath a reader.
/// `statesync-core` maps these into its own `CoreError::Transport`.
#[derive(Debug, Error)]
pub enum Error {
    // ── Addressing ──────────────────────────────────────────────────
    /// A path or path segment violates the store's naming rules.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The backend cannot be reached (offline, shut down, refused).
    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The event channel behind a subscription was closed by the store.
    #[error("Subscription to {path} was closed by the store")]
    SubscriptionClosed { path: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A seed document or wire payload is not valid JSON.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Reading a seed document from disk failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this is a transient error a caller may retry.
    ///
    /// This layer never retries on its own; the flag only helps callers
    /// decide whether to offer a retry affordance.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::SubscriptionClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        let err = Error::Unavailable {
            reason: "offline".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Remote store unavailable: offline");
    }

    #[test]
    fn invalid_path_is_not_transient() {
        let err = Error::InvalidPath {
            path: "a/b.c".into(),
            reason: "segment contains '.'".into(),
        };
        assert!(!err.is_transient());
    }
}
