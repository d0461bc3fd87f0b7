// ── Connection handle ──
//
// The one process-wide link to the remote store. Created explicitly at
// startup and passed to every adapter constructor; shutting it down cancels
// every adapter subscription opened through it.

use std::fmt;
use std::sync::Arc;

use statesync_api::{Path, RemoteStore};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info};

/// Backlog size above which adapters log a warning while pumping.
const DEFAULT_CHANNEL_WARN_DEPTH: usize = 1024;

/// Runtime tuning for a [`Connection`].
///
/// Built by the config crate from the user's settings; never read from disk
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Prefix applied to every adapter path (e.g. `/games/g1`).
    pub namespace: Option<Path>,
    /// Undelivered-event count that triggers a backlog warning.
    pub channel_warn_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            channel_warn_depth: DEFAULT_CHANNEL_WARN_DEPTH,
        }
    }
}

/// Cheaply cloneable handle to the remote store.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    store: Arc<dyn RemoteStore>,
    config: ConnectionConfig,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(store: Arc<dyn RemoteStore>, config: ConnectionConfig) -> Self {
        if let Some(namespace) = &config.namespace {
            debug!(namespace = %namespace, "connection created");
        }
        Self {
            inner: Arc::new(ConnectionInner {
                store,
                config,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// The remote store behind this connection.
    pub fn store(&self) -> &dyn RemoteStore {
        self.inner.store.as_ref()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Map an adapter-relative path to its absolute store path.
    pub fn resolve(&self, path: &Path) -> Path {
        match &self.inner.config.namespace {
            Some(namespace) => namespace.join(path),
            None => path.clone(),
        }
    }

    /// Cancel every adapter subscription opened through this connection.
    ///
    /// Adapters notice on their next `pump()` or inside `run()` and move to
    /// `Closed`. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!("connection shutting down");
            self.inner.cancel.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    /// A token cancelled by `shutdown` or independently by one adapter.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.inner.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use statesync_api::MemoryStore;

    use super::*;

    fn connection(namespace: Option<&str>) -> Connection {
        Connection::new(
            Arc::new(MemoryStore::new()),
            ConnectionConfig {
                namespace: namespace.map(|ns| Path::parse(ns).unwrap()),
                ..ConnectionConfig::default()
            },
        )
    }

    #[test]
    fn resolve_prefixes_namespace() {
        let players = Path::parse("players").unwrap();
        assert_eq!(connection(None).resolve(&players).to_string(), "/players");
        assert_eq!(
            connection(Some("games/g1")).resolve(&players).to_string(),
            "/games/g1/players"
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_child_tokens() {
        let conn = connection(None);
        let token = conn.child_token();
        assert!(!conn.is_shut_down());

        conn.shutdown();
        conn.shutdown();
        conn.cancelled().await;
        assert!(conn.is_shut_down());
        assert!(token.is_cancelled());
    }

    #[test]
    fn child_token_cancel_does_not_shut_down() {
        let conn = connection(None);
        conn.child_token().cancel();
        assert!(!conn.is_shut_down());
    }
}
