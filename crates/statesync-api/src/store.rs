// ── Remote store contract ──
//
// The only surface `statesync-core` depends on. Futures are boxed so the
// trait stays object-safe and a connection can hold `Arc<dyn RemoteStore>`.

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::Error;
use crate::path::Path;

/// Boxed future returned by every [`RemoteStore`] operation.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, Error>>;

// ── Events ──────────────────────────────────────────────────────────

/// One change to the direct children of a subscribed base path.
///
/// A fresh subscription first receives one `Added` per existing child,
/// then `Synced`. Afterwards events mirror remote writes in the order the
/// store applied them.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added { key: String, value: Value },
    Changed { key: String, value: Value },
    Removed { key: String },
    /// The initial snapshot has been delivered in full.
    Synced,
    /// The store dropped this subscription; no further events follow.
    Interrupted { reason: String },
}

impl ChildEvent {
    /// The child key this event refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Added { key, .. } | Self::Changed { key, .. } | Self::Removed { key } => {
                Some(key)
            }
            Self::Synced | Self::Interrupted { .. } => None,
        }
    }
}

/// A change to the whole document at a subscribed path.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueEvent {
    /// The current document; `Value::Null` when the path is empty.
    Value(Value),
    /// The store dropped this subscription; no further events follow.
    Interrupted { reason: String },
}

// ── Subscription handle ─────────────────────────────────────────────

/// Outcome of a non-blocking receive.
#[derive(Debug, Clone, PartialEq)]
pub enum TryRecv<E> {
    Event(E),
    /// Nothing delivered yet; the subscription is still open.
    Empty,
    /// The store side hung up.
    Closed,
}

/// Receiving half of a store subscription.
///
/// Dropping it ends the subscription; the store notices the closed channel
/// on its next delivery and forgets the subscriber.
#[derive(Debug)]
pub struct RemoteSubscription<E> {
    path: Path,
    events: mpsc::UnboundedReceiver<E>,
}

pub type ChildSubscription = RemoteSubscription<ChildEvent>;
pub type ValueSubscription = RemoteSubscription<ValueEvent>;

impl<E> RemoteSubscription<E> {
    pub fn new(path: Path, events: mpsc::UnboundedReceiver<E>) -> Self {
        Self { path, events }
    }

    /// The path this subscription watches.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next event. `None` once the store has hung up.
    pub async fn recv(&mut self) -> Option<E> {
        self.events.recv().await
    }

    /// Take the next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> TryRecv<E> {
        match self.events.try_recv() {
            Ok(event) => TryRecv::Event(event),
            Err(TryRecvError::Empty) => TryRecv::Empty,
            Err(TryRecvError::Disconnected) => TryRecv::Closed,
        }
    }

    /// Number of events delivered but not yet received.
    pub fn backlog(&self) -> usize {
        self.events.len()
    }
}

// ── RemoteStore ─────────────────────────────────────────────────────

/// A tree-structured JSON store addressed by [`Path`].
///
/// Absent and `null` are the same thing: `get` returns `None` for both and
/// `set(path, Value::Null)` deletes. Implementations must deliver events
/// for one subscription in the order writes were applied.
pub trait RemoteStore: Send + Sync {
    /// Fetch the document at `path`.
    fn get<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, Option<Value>>;

    /// Replace the document at `path`; `Value::Null` deletes it.
    fn set<'a>(&'a self, path: &'a Path, value: Value) -> StoreFuture<'a, ()>;

    /// Watch the direct children of `base`.
    fn subscribe_children<'a>(&'a self, base: &'a Path) -> StoreFuture<'a, ChildSubscription>;

    /// Watch the whole document at `path`.
    fn subscribe_value<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, ValueSubscription>;

    /// Delete the document at `path`.
    fn remove<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, ()> {
        self.set(path, Value::Null)
    }
}
