// ── Key-value storage adapter ──
//
// Binds a remote collection (the direct children of one base path) to a
// typed local cache. Remote child events are decoded, applied to the cache
// and fanned out as create/update/delete callbacks, strictly in delivery
// order. Local writes go to the remote and come back as ordinary events.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;
use statesync_api::{ChildEvent, Path, validate_segment};
use tracing::{debug, trace, warn};

use super::{
    ChangeListener, Delivery, Feed, FeedEnd, Reentry, SyncAttempt, SyncState, transition,
};
use crate::codec::{KeyCodec, ValueCodec};
use crate::connection::Connection;
use crate::error::CoreError;
use crate::listener::{ListenerId, ListenerRegistry, Subscription};
use crate::property::{Property, ReadOnlyProperty};

type Listener<KC, VC> = dyn ChangeListener<<KC as KeyCodec>::Key, <VC as ValueCodec>::Value>;

struct Entry<K, V> {
    key: K,
    value: Rc<V>,
}

/// Typed, cached view of a remote collection.
///
/// Cheap to clone; clones share one cache, one listener set and one remote
/// subscription. The adapter is `!Send`: events are applied on the thread
/// that calls [`pump`](Self::pump) or drives [`run`](Self::run).
///
/// Cache iteration order is arrival order. An update keeps the entry's
/// position and a removal keeps the relative order of the rest.
pub struct KeyValueStorage<KC: KeyCodec, VC: ValueCodec> {
    inner: Rc<KvInner<KC, VC>>,
}

pub(crate) struct KvInner<KC: KeyCodec, VC: ValueCodec> {
    connection: Connection,
    base: Path,
    key_codec: KC,
    value_codec: VC,
    cache: RefCell<IndexMap<String, Entry<KC::Key, VC::Value>>>,
    listeners: ListenerRegistry<Listener<KC, VC>>,
    state: Property<SyncState>,
    feed: Feed<ChildEvent>,
    applying: Cell<bool>,
    /// Raw keys seen since the current (re)sync started.
    resync: RefCell<Option<HashSet<String>>>,
}

impl<KC, VC> KeyValueStorage<KC, VC>
where
    KC: KeyCodec + 'static,
    VC: ValueCodec + 'static,
    KC::Key: Clone + 'static,
    VC::Value: 'static,
{
    /// Build an adapter in `Uninitialized`. Nothing is fetched until
    /// [`start`](Self::start); register listeners first to receive the
    /// initial snapshot as `on_create` calls.
    pub fn new(connection: &Connection, base: &Path, key_codec: KC, value_codec: VC) -> Self {
        let warn_depth = connection.config().channel_warn_depth;
        Self {
            inner: Rc::new(KvInner {
                base: connection.resolve(base),
                feed: Feed::new(connection.child_token(), warn_depth),
                connection: connection.clone(),
                key_codec,
                value_codec,
                cache: RefCell::new(IndexMap::new()),
                listeners: ListenerRegistry::new(),
                state: Property::new(SyncState::Uninitialized),
                applying: Cell::new(false),
                resync: RefCell::new(None),
            }),
        }
    }

    /// [`new`](Self::new) followed by [`start`](Self::start).
    pub async fn open(
        connection: &Connection,
        base: &Path,
        key_codec: KC,
        value_codec: VC,
    ) -> Result<Self, CoreError> {
        let storage = Self::new(connection, base, key_codec, value_codec);
        storage.start().await?;
        Ok(storage)
    }

    /// Subscribe to the remote collection and apply its initial snapshot.
    ///
    /// Resolves once the store reports the snapshot complete, leaving the
    /// adapter `Live`. Calling it on a `Stale` adapter resubscribes and
    /// reconciles: keys missing from the new snapshot are deleted. On a
    /// `Syncing` or `Live` adapter it does nothing. Dropping the future
    /// before it resolves leaves the adapter `Stale`.
    pub async fn start(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        match inner.state.get() {
            SyncState::Uninitialized | SyncState::Stale { .. } => {}
            SyncState::Syncing | SyncState::Live => return Ok(()),
            SyncState::Closed => return Err(CoreError::Closed { operation: "start" }),
        }
        inner.ensure_open("start")?;

        let _attempt = SyncAttempt::begin(&inner.state, &inner.feed, &inner.base);
        *inner.resync.borrow_mut() = Some(HashSet::new());
        let subscription = match inner.connection.store().subscribe_children(&inner.base).await {
            Ok(subscription) => subscription,
            Err(err) => {
                let err = CoreError::from(err);
                transition(
                    &inner.state,
                    SyncState::Stale {
                        reason: err.to_string(),
                    },
                    &inner.base,
                );
                return Err(err);
            }
        };
        inner.feed.attach(subscription);

        loop {
            match inner.feed.next().await {
                Delivery::Event(event) => {
                    let _guard = Reentry::enter(&inner.applying);
                    inner.apply(event);
                }
                Delivery::Idle => {}
                Delivery::Ended(FeedEnd::Detached) => transition(
                    &inner.state,
                    SyncState::Stale {
                        reason: "subscription detached during sync".into(),
                    },
                    &inner.base,
                ),
                Delivery::Ended(end) => inner.on_end(end),
            }

            match inner.state.get() {
                SyncState::Live => return Ok(()),
                SyncState::Stale { reason } => {
                    return Err(CoreError::Transport {
                        message: reason,
                        transient: true,
                    });
                }
                SyncState::Closed => return Err(CoreError::Closed { operation: "start" }),
                SyncState::Uninitialized | SyncState::Syncing => {}
            }
        }
    }

    /// The absolute base path of the collection.
    pub fn base(&self) -> &Path {
        &self.inner.base
    }

    pub fn state(&self) -> ReadOnlyProperty<SyncState> {
        self.inner.state.read_only()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The cached value for `key`.
    pub fn get(&self, key: &KC::Key) -> Option<Rc<VC::Value>> {
        self.inner.cached(key)
    }

    pub fn contains_key(&self, key: &KC::Key) -> bool {
        let raw = self.inner.key_codec.encode(key);
        self.inner.cache.borrow().contains_key(&raw)
    }

    pub fn len(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time copy of the cache, in cache order.
    ///
    /// Later remote events do not change a snapshot already taken.
    pub fn get_all(&self) -> Result<Snapshot<KC::Key, VC::Value>, CoreError> {
        self.inner.ensure_open("get_all")?;
        Ok(self.inner.snapshot())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the remote child for `key`; `None` deletes it.
    ///
    /// The cache is not touched here. The change arrives back through the
    /// subscription like any other remote write.
    pub async fn write(&self, key: &KC::Key, value: Option<&VC::Value>) -> Result<(), CoreError> {
        let inner = &self.inner;
        inner.ensure_open("write")?;
        let path = inner.child_path(key)?;
        let raw = match value {
            Some(value) => inner.value_codec.encode(value)?,
            None => Value::Null,
        };
        debug!(path = %path, delete = raw.is_null(), "writing child");
        inner.connection.store().set(&path, raw).await?;
        Ok(())
    }

    /// Delete the remote child for `key`.
    pub async fn delete(&self, key: &KC::Key) -> Result<(), CoreError> {
        self.write(key, None).await
    }

    // ── Listeners ────────────────────────────────────────────────────

    pub fn add_listener(
        &self,
        listener: impl ChangeListener<KC::Key, VC::Value> + 'static,
    ) -> ListenerId {
        self.inner.listeners.add(Rc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Like [`add_listener`](Self::add_listener), deregistering when the
    /// returned [`Subscription`] is closed or dropped.
    pub fn subscribe(
        &self,
        listener: impl ChangeListener<KC::Key, VC::Value> + 'static,
    ) -> Subscription {
        let id = self.add_listener(listener);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // ── Event application ────────────────────────────────────────────

    /// Apply every event the transport has already delivered.
    ///
    /// Returns the number of events applied. Calls made from inside a
    /// listener callback return 0 without applying anything.
    pub fn pump(&self) -> usize {
        let inner = &self.inner;
        let Some(_guard) = Reentry::enter(&inner.applying) else {
            return 0;
        };
        inner.feed.check_backlog(&inner.base);

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

    /// Apply events as they arrive until the adapter closes, goes stale,
    /// or the connection shuts down.
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
        debug!(base = %inner.base, state = %inner.state.get(), "adapter run loop finished");
    }

    /// Drop the remote subscription and every listener. Terminal.
    ///
    /// The cache stays readable through [`get`](Self::get); `write`,
    /// `delete` and `get_all` fail with [`CoreError::Closed`].
    pub fn close(&self) {
        self.inner.shut();
    }

    pub(crate) fn downgrade(&self) -> WeakStorage<KC, VC> {
        WeakStorage(Rc::downgrade(&self.inner))
    }

    /// Position of `key` in cache order.
    pub(crate) fn position(&self, key: &KC::Key) -> Option<usize> {
        let raw = self.inner.key_codec.encode(key);
        self.inner.cache.borrow().get_index_of(&raw)
    }

    /// The cache, ignoring the closed check.
    pub(crate) fn entries(&self) -> Snapshot<KC::Key, VC::Value> {
        self.inner.snapshot()
    }
}

impl<KC, VC> KvInner<KC, VC>
where
    KC: KeyCodec,
    VC: ValueCodec,
    KC::Key: Clone,
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
        self.resync.borrow_mut().take();
        transition(&self.state, SyncState::Closed, &self.base);
        self.listeners.clear();
    }

    fn on_end(&self, end: FeedEnd) {
        match end {
            FeedEnd::Cancelled => self.shut(),
            FeedEnd::HungUp => transition(
                &self.state,
                SyncState::Stale {
                    reason: "subscription closed by the store".into(),
                },
                &self.base,
            ),
            FeedEnd::Detached => {}
        }
    }

    fn child_path(&self, key: &KC::Key) -> Result<Path, CoreError> {
        let raw = self.key_codec.encode(key);
        if let Err(reason) = validate_segment(&raw) {
            return Err(CoreError::InvalidKey { key: raw, reason });
        }
        Ok(self.base.child(&raw)?)
    }

    fn cached(&self, key: &KC::Key) -> Option<Rc<VC::Value>> {
        let raw = self.key_codec.encode(key);
        self.cache
            .borrow()
            .get(&raw)
            .map(|entry| Rc::clone(&entry.value))
    }

    fn snapshot(&self) -> Snapshot<KC::Key, VC::Value> {
        Snapshot {
            entries: self
                .cache
                .borrow()
                .values()
                .map(|entry| (entry.key.clone(), Rc::clone(&entry.value)))
                .collect(),
        }
    }

    fn apply(&self, event: ChildEvent) {
        trace!(base = %self.base, ?event, "applying child event");
        match event {
            ChildEvent::Added { key, value } | ChildEvent::Changed { key, value } => {
                self.apply_child(&key, &value);
            }
            ChildEvent::Removed { key } => self.apply_child(&key, &Value::Null),
            ChildEvent::Synced => self.finish_sync(),
            ChildEvent::Interrupted { reason } => {
                self.feed.detach();
                transition(&self.state, SyncState::Stale { reason }, &self.base);
            }
        }
    }

    fn apply_child(&self, raw_key: &str, raw: &Value) {
        let key = match self.key_codec.decode(raw_key) {
            Ok(key) => key,
            Err(err) => {
                warn!(base = %self.base, key = %raw_key, error = %err, "skipping child with undecodable key");
                return;
            }
        };
        // Entries live under the re-encoded key so `get(&key)` and the
        // snapshot always agree, whatever spelling the store used.
        let slot = self.key_codec.encode(&key);
        if let Some(seen) = self.resync.borrow_mut().as_mut() {
            seen.insert(slot.clone());
        }

        // A tombstone always deletes, whatever the codec's absent policy.
        if raw.is_null() {
            self.remove(&slot);
            return;
        }
        match self.value_codec.decode(raw) {
            Ok(value) => self.upsert(&slot, key, value),
            Err(err) => {
                warn!(base = %self.base, key = %raw_key, error = %err, "skipping child with undecodable value");
            }
        }
    }

    fn upsert(&self, raw_key: &str, key: KC::Key, value: VC::Value) {
        let value = Rc::new(value);
        let previous = {
            let mut cache = self.cache.borrow_mut();
            if let Some(entry) = cache.get_mut(raw_key) {
                Some(std::mem::replace(&mut entry.value, Rc::clone(&value)))
            } else {
                cache.insert(
                    raw_key.to_owned(),
                    Entry {
                        key: key.clone(),
                        value: Rc::clone(&value),
                    },
                );
                None
            }
        };

        match previous {
            Some(old) => self
                .listeners
                .dispatch(|listener| listener.on_update(&key, &old, &value)),
            None => self
                .listeners
                .dispatch(|listener| listener.on_create(&key, &value)),
        }
    }

    fn remove(&self, raw_key: &str) {
        let removed = self.cache.borrow_mut().shift_remove(raw_key);
        match removed {
            Some(entry) => self
                .listeners
                .dispatch(|listener| listener.on_delete(&entry.key, &entry.value)),
            None => trace!(base = %self.base, key = %raw_key, "delete of uncached key ignored"),
        }
    }

    /// End of the initial snapshot: drop keys the new snapshot no longer
    /// has (only possible on a resync) and go live.
    fn finish_sync(&self) {
        let seen = self.resync.borrow_mut().take();
        if let Some(seen) = seen {
            let missing: Vec<String> = self
                .cache
                .borrow()
                .keys()
                .filter(|raw| !seen.contains(*raw))
                .cloned()
                .collect();
            for raw in missing {
                self.remove(&raw);
            }
        }
        transition(&self.state, SyncState::Live, &self.base);
    }
}

impl<KC: KeyCodec, VC: ValueCodec> Clone for KeyValueStorage<KC, VC> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<KC: KeyCodec, VC: ValueCodec> fmt::Debug for KeyValueStorage<KC, VC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyValueStorage")
            .field("base", &self.inner.base)
            .field("state", &self.inner.state)
            .field("len", &self.inner.cache.try_borrow().map(|c| c.len()).ok())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

/// Non-owning handle used by projections so a listener never keeps its
/// own adapter alive.
pub(crate) struct WeakStorage<KC: KeyCodec, VC: ValueCodec>(Weak<KvInner<KC, VC>>);

impl<KC: KeyCodec, VC: ValueCodec> WeakStorage<KC, VC> {
    pub(crate) fn upgrade(&self) -> Option<KeyValueStorage<KC, VC>> {
        self.0.upgrade().map(|inner| KeyValueStorage { inner })
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// Detached copy of a [`KeyValueStorage`] cache, in cache order.
#[derive(Debug)]
pub struct Snapshot<K, V> {
    entries: Vec<(K, Rc<V>)>,
}

impl<K, V> Snapshot<K, V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, value)| (key, value.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn get(&self, key: &K) -> Option<&V>
    where
        K: PartialEq,
    {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn into_vec(self) -> Vec<(K, Rc<V>)> {
        self.entries
    }
}

impl<K: Clone, V> Clone for Snapshot<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> IntoIterator for Snapshot<K, V> {
    type Item = (K, Rc<V>);
    type IntoIter = std::vec::IntoIter<(K, Rc<V>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
