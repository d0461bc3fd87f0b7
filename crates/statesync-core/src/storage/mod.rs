// ── Remote-backed storage adapters ──
//
// Both adapters follow the same lifecycle and event plumbing: a remote
// subscription feeds an unbounded channel, and events are applied on the
// owning thread by `pump()` or `run()`. Nothing here is `Send`.

pub(crate) mod keyvalue;
mod object;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use statesync_api::{Path, RemoteSubscription, TryRecv};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::property::Property;

pub use keyvalue::{KeyValueStorage, Snapshot};
pub use object::ObjectStorage;

// ── SyncState ────────────────────────────────────────────────────────

/// Lifecycle of an adapter, observable through its `state()` property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Constructed, no remote subscription yet.
    #[default]
    Uninitialized,
    /// Subscribed; the initial snapshot is being applied.
    Syncing,
    /// Tracking the remote.
    Live,
    /// The remote subscription was lost. The cache keeps the last good data
    /// and is not refreshed until the adapter is reopened.
    Stale { reason: String },
    /// Closed by the owner or by connection shutdown. Terminal.
    Closed,
}

impl SyncState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Syncing => f.write_str("syncing"),
            Self::Live => f.write_str("live"),
            Self::Stale { reason } => write!(f, "stale ({reason})"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Move `state` to `next`, logging the transition. `Closed` is terminal.
pub(crate) fn transition(state: &Property<SyncState>, next: SyncState, path: &Path) {
    let current = state.get();
    if current.is_closed() || current == next {
        return;
    }
    match &next {
        SyncState::Stale { reason } => {
            warn!(path = %path, reason = %reason, "adapter went stale");
        }
        _ => debug!(path = %path, from = %current, to = %next, "adapter state change"),
    }
    state.set(next);
}

/// One run of an adapter's `start()`. Enters `Syncing` on creation.
///
/// If the attempt is dropped while still `Syncing` (its future was
/// abandoned mid-snapshot), the half-read subscription is detached and the
/// adapter goes `Stale`, so the next `start()` subscribes afresh.
pub(crate) struct SyncAttempt<'a, E> {
    state: &'a Property<SyncState>,
    feed: &'a Feed<E>,
    path: &'a Path,
}

impl<'a, E> SyncAttempt<'a, E> {
    pub(crate) fn begin(state: &'a Property<SyncState>, feed: &'a Feed<E>, path: &'a Path) -> Self {
        transition(state, SyncState::Syncing, path);
        Self { state, feed, path }
    }
}

impl<E> Drop for SyncAttempt<'_, E> {
    fn drop(&mut self) {
        if self.state.with(|state| *state == SyncState::Syncing) {
            self.feed.detach();
            transition(
                self.state,
                SyncState::Stale {
                    reason: "sync abandoned before the snapshot completed".into(),
                },
                self.path,
            );
        }
    }
}

// ── Change listeners ─────────────────────────────────────────────────

/// Per-key callbacks from a [`KeyValueStorage`].
///
/// Every method defaults to doing nothing, so implementors only override
/// the transitions they care about. Callbacks run synchronously on the
/// thread that applies remote events, in registration order.
pub trait ChangeListener<K, V> {
    /// A key appeared in the cache.
    fn on_create(&self, _key: &K, _value: &V) {}

    /// A cached key received a new value.
    fn on_update(&self, _key: &K, _old: &V, _new: &V) {}

    /// A cached key was removed remotely.
    fn on_delete(&self, _key: &K, _old: &V) {}
}

/// One cache transition, as seen by an [`FnListener`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change<'a, K, V> {
    Created { key: &'a K, value: &'a V },
    Updated { key: &'a K, old: &'a V, new: &'a V },
    Deleted { key: &'a K, old: &'a V },
}

impl<'a, K, V> Change<'a, K, V> {
    pub fn key(&self) -> &'a K {
        match self {
            Self::Created { key, .. } | Self::Updated { key, .. } | Self::Deleted { key, .. } => key,
        }
    }

    /// The value after the change; `None` for deletions.
    pub fn value(&self) -> Option<&'a V> {
        match self {
            Self::Created { value, .. } => Some(value),
            Self::Updated { new, .. } => Some(new),
            Self::Deleted { .. } => None,
        }
    }

    /// Short lowercase label (`create`, `update`, `delete`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "create",
            Self::Updated { .. } => "update",
            Self::Deleted { .. } => "delete",
        }
    }
}

/// Adapts one closure over [`Change`] into a [`ChangeListener`].
pub struct FnListener<F>(pub F);

impl<K, V, F> ChangeListener<K, V> for FnListener<F>
where
    F: Fn(Change<'_, K, V>),
{
    fn on_create(&self, key: &K, value: &V) {
        (self.0)(Change::Created { key, value });
    }

    fn on_update(&self, key: &K, old: &V, new: &V) {
        (self.0)(Change::Updated { key, old, new });
    }

    fn on_delete(&self, key: &K, old: &V) {
        (self.0)(Change::Deleted { key, old });
    }
}

impl<K, V, L: ChangeListener<K, V> + ?Sized> ChangeListener<K, V> for Rc<L> {
    fn on_create(&self, key: &K, value: &V) {
        (**self).on_create(key, value);
    }

    fn on_update(&self, key: &K, old: &V, new: &V) {
        (**self).on_update(key, old, new);
    }

    fn on_delete(&self, key: &K, old: &V) {
        (**self).on_delete(key, old);
    }
}

/// Marks an adapter as applying events; a nested `pump()` from inside a
/// listener sees the flag and returns without applying anything.
pub(crate) struct Reentry<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> Reentry<'a> {
    pub(crate) fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for Reentry<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

// ── Event feed ───────────────────────────────────────────────────────

/// Result of asking a [`Feed`] for its next event.
#[derive(Debug)]
pub(crate) enum Delivery<E> {
    Event(E),
    /// Nothing buffered right now.
    Idle,
    Ended(FeedEnd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedEnd {
    /// The adapter was closed or the connection shut down.
    Cancelled,
    /// The store dropped the channel without an `Interrupted` event.
    HungUp,
    /// No subscription is attached (not started, stale, or checked out by
    /// a running `run()` loop).
    Detached,
}

/// Holder for an adapter's remote subscription plus its cancellation token.
pub(crate) struct Feed<E> {
    slot: RefCell<Option<RemoteSubscription<E>>>,
    cancel: CancellationToken,
    warn_depth: usize,
}

impl<E> Feed<E> {
    pub(crate) fn new(cancel: CancellationToken, warn_depth: usize) -> Self {
        Self {
            slot: RefCell::new(None),
            cancel,
            warn_depth,
        }
    }

    pub(crate) fn attach(&self, subscription: RemoteSubscription<E>) {
        *self.slot.borrow_mut() = Some(subscription);
    }

    /// Drop the remote subscription, if any.
    pub(crate) fn detach(&self) {
        let dropped = self.slot.borrow_mut().take();
        drop(dropped);
    }

    /// Cancel and detach. Wakes a `run()` loop waiting on this feed.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
        self.detach();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Log once if the transport is far ahead of the consumer.
    pub(crate) fn check_backlog(&self, path: &Path) {
        let backlog = self
            .slot
            .borrow()
            .as_ref()
            .map_or(0, RemoteSubscription::backlog);
        if backlog >= self.warn_depth {
            warn!(path = %path, backlog, "adapter is falling behind the remote store");
        }
    }

    /// Take the next buffered event without waiting.
    pub(crate) fn try_next(&self) -> Delivery<E> {
        if self.cancel.is_cancelled() {
            self.detach();
            return Delivery::Ended(FeedEnd::Cancelled);
        }
        let mut slot = self.slot.borrow_mut();
        let Some(subscription) = slot.as_mut() else {
            return Delivery::Ended(FeedEnd::Detached);
        };
        match subscription.try_recv() {
            TryRecv::Event(event) => Delivery::Event(event),
            TryRecv::Empty => Delivery::Idle,
            TryRecv::Closed => {
                *slot = None;
                Delivery::Ended(FeedEnd::HungUp)
            }
        }
    }

    /// Wait for the next event or cancellation.
    ///
    /// The subscription is checked out of the slot while waiting, so the
    /// feed's `RefCell` is never borrowed across an await point. It goes
    /// back on return, or on drop if the caller abandons the future.
    pub(crate) async fn next(&self) -> Delivery<E> {
        if self.cancel.is_cancelled() {
            self.detach();
            return Delivery::Ended(FeedEnd::Cancelled);
        }
        let Some(subscription) = self.slot.borrow_mut().take() else {
            return Delivery::Ended(FeedEnd::Detached);
        };
        let mut lease = Lease {
            feed: self,
            subscription: Some(subscription),
        };
        let Some(subscription) = lease.subscription.as_mut() else {
            return Delivery::Ended(FeedEnd::Detached);
        };

        let received = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = subscription.recv() => Some(event),
        };
        match received {
            None => {
                lease.subscription = None;
                Delivery::Ended(FeedEnd::Cancelled)
            }
            Some(None) => {
                lease.subscription = None;
                Delivery::Ended(FeedEnd::HungUp)
            }
            Some(Some(event)) => Delivery::Event(event),
        }
    }
}

/// Returns a checked-out subscription to its feed unless cancelled.
struct Lease<'a, E> {
    feed: &'a Feed<E>,
    subscription: Option<RemoteSubscription<E>>,
}

impl<E> Drop for Lease<'_, E> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if !self.feed.cancel.is_cancelled() {
                *self.feed.slot.borrow_mut() = Some(subscription);
            }
        }
    }
}
