// ── Object storage adapter ──
//
// One domain value bound to one fixed path. Same lifecycle as the key-value
// adapter, with cardinality one: the current value lives in a `Property`
// and subscribers are called with the decoded document on every change.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use statesync_api::{Path, ValueEvent};
use tracing::{debug, trace, warn};

use super::{Delivery, Feed, FeedEnd, Reentry, SyncAttempt, SyncState, transition};
use crate::codec::ValueCodec;
use crate::connection::Connection;
use crate::error::CoreError;
use crate::listener::Subscription;
use crate::property::{Property, ReadOnlyProperty};

/// Typed view of the single document at one path.
pub struct ObjectStorage<C: ValueCodec> {
    inner: Rc<ObjectInner<C>>,
}

struct ObjectInner<C: ValueCodec> {
    connection: Connection,
    path: Path,
    codec: C,
    current: Property<Option<Rc<C::Value>>>,
    state: Property<SyncState>,
    feed: Feed<ValueEvent>,
    applying: Cell<bool>,
}

impl<C> ObjectStorage<C>
where
    C: ValueCodec + 'static,
    C::Value: 'static,
{
    /// Build an adapter in `Uninitialized`; see [`start`](Self::start).
    pub fn new(connection: &Connection, path: &Path, codec: C) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                path: connection.resolve(path),
                feed: Feed::new(
                    connection.child_token(),
                    connection.config().channel_warn_depth,
                ),
                connection: connection.clone(),
                codec,
                current: Property::new(None),
                state: Property::new(SyncState::Uninitialized),
                applying: Cell::new(false),
            }),
        }
    }

    /// [`new`](Self::new) followed by [`start`](Self::start).
    pub async fn open(connection: &Connection, path: &Path, codec: C) -> Result<Self, CoreError> {
        let storage = Self::new(connection, path, codec);
        storage.start().await?;
        Ok(storage)
    }

    /// Subscribe to the document and wait for its first value.
    pub async fn start(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        match inner.state.get() {
            SyncState::Uninitialized | SyncState::Stale { .. } => {}
            SyncState::Syncing | SyncState::Live => return Ok(()),
            SyncState::Closed => return Err(CoreError::Closed { operation: "start" }),
        }
        inner.ensure_open("start")?;

        let _attempt = SyncAttempt::begin(&inner.state, &inner.feed, &inner.path);
        let subscription = match inner.connection.store().subscribe_value(&inner.path).await {
            Ok(subscription) => subscription,
            Err(err) => {
                let err = CoreError::from(err);
                inner.go_stale(err.to_string());
                return Err(err);
            }
        };
        inner.feed.attach(subscription);

        match inner.feed.next().await {
            Delivery::Event(event) => {
                let _guard = Reentry::enter(&inner.applying);
                inner.apply(event);
            }
            Delivery::Ended(FeedEnd::Cancelled) => inner.shut(),
            Delivery::Idle | Delivery::Ended(_) => {
                inner.go_stale("subscription closed before the first value".into());
            }
        }

        match inner.state.get() {
            SyncState::Live => Ok(()),
            SyncState::Closed => Err(CoreError::Closed { operation: "start" }),
            SyncState::Stale { reason } => Err(CoreError::Transport {
                message: reason,
                transient: true,
            }),
            SyncState::Uninitialized | SyncState::Syncing => Err(CoreError::Transport {
                message: "no initial value".into(),
                transient: true,
            }),
        }
    }

    /// The absolute path of the document.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn state(&self) -> ReadOnlyProperty<SyncState> {
        self.inner.state.read_only()
    }

    /// The last decoded value, `None` when absent.
    pub fn current(&self) -> Option<Rc<C::Value>> {
        self.inner.current.get()
    }

    /// The current value as an observable property.
    pub fn value(&self) -> ReadOnlyProperty<Option<Rc<C::Value>>> {
        self.inner.current.read_only()
    }

    /// Fetch and decode the remote document, bypassing the cached value.
    ///
    /// Absence is not an error: it decodes through the codec's absent
    /// policy, which yields `None` by default.
    pub async fn read(&self) -> Result<Option<C::Value>, CoreError> {
        let inner = &self.inner;
        inner.ensure_open("read")?;
        match inner.connection.store().get(&inner.path).await? {
            None | Some(Value::Null) => Ok(inner.codec.decode_absent()),
            Some(raw) => inner
                .codec
                .decode(&raw)
                .map(Some)
                .map_err(|err| CoreError::decode(inner.path.to_string(), err)),
        }
    }

    /// Replace the remote document. Last write wins.
    pub async fn write(&self, value: &C::Value) -> Result<(), CoreError> {
        let inner = &self.inner;
        inner.ensure_open("write")?;
        let raw = inner.codec.encode(value)?;
        debug!(path = %inner.path, "writing document");
        inner.connection.store().set(&inner.path, raw).await?;
        Ok(())
    }

    /// Delete the remote document.
    pub async fn clear(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        inner.ensure_open("clear")?;
        debug!(path = %inner.path, "clearing document");
        inner.connection.store().remove(&inner.path).await?;
        Ok(())
    }

    /// Call `on_change` now with the current value, then after every
    /// remote change until the subscription is closed.
    pub fn subscribe(&self, on_change: impl Fn(Option<&C::Value>) + 'static) -> Subscription {
        self.inner.current.with(|current| on_change(current.as_deref()));
        self.inner
            .current
            .subscribe(move |_, new| on_change(new.as_deref()))
    }

    /// Apply every event the transport has already delivered.
    pub fn pump(&self) -> usize {
        let inner = &self.inner;
        let Some(_guard) = Reentry::enter(&inner.applying) else {
            return 0;
        };
        inner.feed.check_backlog(&inner.path);

        let mut applied = 0;
        loop {
            match inner.feed.try_next() {
                Delivery::Event(event) => {
                    inner.apply(event);
                    applied += 1;
                }
                Delivery::Idle | Delivery::Ended(FeedEnd::Detached) => break,
                Delivery::Ended(end) => {
                    inner.on_end(end);
                    break;
                }
            }
        }
        applied
    }

    /// Apply events as they arrive until closed, stale or shut down.
    pub async fn run(&self) {
        let inner = &self.inner;
        loop {
            match inner.feed.next().await {
                Delivery::Event(event) => {
                    let _guard = Reentry::enter(&inner.applying);
                    inner.apply(event);
                }
                Delivery::Idle => {}
                Delivery::Ended(FeedEnd::Detached) => break,
                Delivery::Ended(end) => {
                    inner.on_end(end);
                    break;
                }
            }
        }
    }

    /// Drop the remote subscription and all subscribers. Terminal.
    pub fn close(&self) {
        self.inner.shut();
    }
}

impl<C> ObjectInner<C>
where
    C: ValueCodec + 'static,
    C::Value: 'static,
{
    fn ensure_open(&self, operation: &'static str) -> Result<(), CoreError> {
        if self.connection.is_shut_down() {
            self.shut();
        }
        if self.state.with(SyncState::is_closed) {
            return Err(CoreError::Closed { operation });
        }
        Ok(())
    }

    fn shut(&self) {
        self.feed.cancel();
        transition(&self.state, SyncState::Closed, &self.path);
        // Drop subscribers without touching the value.
        let listeners = self.current.listener_count();
        if listeners > 0 {
            trace!(path = %self.path, listeners, "dropping document subscribers");
        }
        self.current.clear_listeners();
    }

    fn go_stale(&self, reason: String) {
        transition(&self.state, SyncState::Stale { reason }, &self.path);
    }

    fn on_end(&self, end: FeedEnd) {
        match end {
            FeedEnd::Cancelled => self.shut(),
            FeedEnd::HungUp => self.go_stale("subscription closed by the store".into()),
            FeedEnd::Detached => {}
        }
    }

    fn apply(&self, event: ValueEvent) {
        match event {
            ValueEvent::Value(raw) => {
                let next = if raw.is_null() {
                    self.codec.decode_absent()
                } else {
                    match self.codec.decode(&raw) {
                        Ok(value) => Some(value),
                        Err(err) => {
                            warn!(path = %self.path, error = %err, "keeping last value: document does not decode");
                            self.mark_live();
                            return;
                        }
                    }
                };
                self.current.set(next.map(Rc::new));
                self.mark_live();
            }
            ValueEvent::Interrupted { reason } => {
                self.feed.detach();
                self.go_stale(reason);
            }
        }
    }

    fn mark_live(&self) {
        if self.state.with(|state| *state == SyncState::Syncing) {
            transition(&self.state, SyncState::Live, &self.path);
        }
    }
}

impl<C: ValueCodec> Clone for ObjectStorage<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: ValueCodec> fmt::Debug for ObjectStorage<C>
where
    C::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("path", &self.inner.path)
            .field("state", &self.inner.state)
            .field("current", &self.inner.current)
            .finish()
    }
}
