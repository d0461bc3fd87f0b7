// ── Derived collection projection ──
//
// A listener that keeps an ordered, optionally filtered copy of a key-value
// adapter's cache in a `Property`, for presentation to bind against.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::codec::{KeyCodec, ValueCodec};
use crate::listener::Subscription;
use crate::property::{Property, ReadOnlyProperty};
use crate::storage::keyvalue::WeakStorage;
use crate::storage::{ChangeListener, KeyValueStorage};

/// The projected sequence: `(key, value)` pairs in projection order.
pub type Items<K, V> = Rc<Vec<(K, Rc<V>)>>;

/// How a projection reacts to each cache change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// Re-read the whole cache, filter and sort. O(n log n) per event.
    Rebuild,
    /// Remove and insert only the changed entry, locating it by binary
    /// search. Yields the same sequence as `Rebuild`.
    #[default]
    Incremental,
}

/// Sort order of a projection. Ties keep cache order.
pub enum Order<V> {
    /// Cache (arrival) order.
    Cache,
    By(Box<dyn Fn(&V, &V) -> Ordering>),
}

impl<V> Order<V> {
    pub fn compare(&self, a: &V, b: &V) -> Ordering {
        match self {
            Self::Cache => Ordering::Equal,
            Self::By(f) => f(a, b),
        }
    }
}

/// Which entries a projection keeps.
pub enum Filter<K, V> {
    All,
    Custom(Box<dyn Fn(&K, &V) -> bool>),
}

impl<K, V> Filter<K, V> {
    pub fn matches(&self, key: &K, value: &V) -> bool {
        match self {
            Self::All => true,
            Self::Custom(f) => f(key, value),
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Configures a [`CollectionProjection`] before attaching it.
pub struct ProjectionBuilder<K, V> {
    mode: ProjectionMode,
    order: Order<V>,
    filter: Filter<K, V>,
}

impl<K: 'static, V: 'static> ProjectionBuilder<K, V> {
    pub fn mode(mut self, mode: ProjectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn order(mut self, order: Order<V>) -> Self {
        self.order = order;
        self
    }

    pub fn sort_by(self, compare: impl Fn(&V, &V) -> Ordering + 'static) -> Self {
        self.order(Order::By(Box::new(compare)))
    }

    pub fn sort_by_key<T: Ord>(self, key: impl Fn(&V) -> T + 'static) -> Self {
        self.sort_by(move |a, b| key(a).cmp(&key(b)))
    }

    pub fn filter(mut self, keep: impl Fn(&K, &V) -> bool + 'static) -> Self {
        self.filter = Filter::Custom(Box::new(keep));
        self
    }

    /// Fill from the adapter's current cache and start tracking it.
    pub fn attach<KC, VC>(self, storage: &KeyValueStorage<KC, VC>) -> CollectionProjection<K, V>
    where
        KC: KeyCodec<Key = K> + 'static,
        VC: ValueCodec<Value = V> + 'static,
        K: Clone + PartialEq,
    {
        let projector = Projector {
            storage: storage.downgrade(),
            items: Property::new(Rc::new(Vec::new())),
            mode: self.mode,
            order: self.order,
            filter: self.filter,
        };
        projector.items.set(Rc::new(projector.build(storage)));
        let items = projector.items.clone();
        let link = storage.subscribe(projector);
        CollectionProjection {
            items,
            link: RefCell::new(Some(link)),
        }
    }
}

// ── CollectionProjection ─────────────────────────────────────────────

/// Read-only, ordered view of a [`KeyValueStorage`] cache.
///
/// Updated synchronously from the adapter's change callbacks, once per
/// change that affects it. Dropping the projection detaches it.
pub struct CollectionProjection<K, V> {
    items: Property<Items<K, V>>,
    link: RefCell<Option<Subscription>>,
}

impl<K, V> CollectionProjection<K, V>
where
    K: Clone + PartialEq + 'static,
    V: 'static,
{
    pub fn builder() -> ProjectionBuilder<K, V> {
        ProjectionBuilder {
            mode: ProjectionMode::default(),
            order: Order::Cache,
            filter: Filter::All,
        }
    }

    /// Project every entry in cache order.
    pub fn attach<KC, VC>(storage: &KeyValueStorage<KC, VC>) -> Self
    where
        KC: KeyCodec<Key = K> + 'static,
        VC: ValueCodec<Value = V> + 'static,
    {
        Self::builder().attach(storage)
    }

    /// The projected sequence as an observable property.
    pub fn items(&self) -> ReadOnlyProperty<Items<K, V>> {
        self.items.read_only()
    }

    /// The current sequence.
    pub fn get(&self) -> Items<K, V> {
        self.items.get()
    }

    pub fn len(&self) -> usize {
        self.items.with(|items| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop tracking the adapter. The last sequence is kept.
    pub fn detach(&self) {
        let link = self.link.borrow_mut().take();
        if let Some(link) = link {
            link.close();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.link.borrow().is_some()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CollectionProjection<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionProjection")
            .field("items", &self.items)
            .field("attached", &self.link.borrow().is_some())
            .finish()
    }
}

// ── Projector (the listener) ─────────────────────────────────────────

struct Projector<KC: KeyCodec, VC: ValueCodec> {
    storage: WeakStorage<KC, VC>,
    items: Property<Items<KC::Key, VC::Value>>,
    mode: ProjectionMode,
    order: Order<VC::Value>,
    filter: Filter<KC::Key, VC::Value>,
}

type Entries<K, V> = Vec<(K, Rc<V>)>;

impl<KC, VC> Projector<KC, VC>
where
    KC: KeyCodec + 'static,
    VC: ValueCodec + 'static,
    KC::Key: Clone + PartialEq + 'static,
    VC::Value: 'static,
{
    /// Filter and stable-sort the whole cache.
    fn build(&self, storage: &KeyValueStorage<KC, VC>) -> Entries<KC::Key, VC::Value> {
        let mut entries: Entries<KC::Key, VC::Value> = storage
            .entries()
            .into_iter()
            .filter(|(key, value)| self.filter.matches(key, value))
            .collect();
        if !matches!(self.order, Order::Cache) {
            entries.sort_by(|(_, a), (_, b)| self.order.compare(a, b));
        }
        entries
    }

    fn rebuild(&self) {
        if let Some(storage) = self.storage.upgrade() {
            self.items.set(Rc::new(self.build(&storage)));
        }
    }

    /// Range of `entries` whose value sorts equal to `value`.
    fn equal_range(&self, entries: &[(KC::Key, Rc<VC::Value>)], value: &VC::Value) -> (usize, usize) {
        let lo = entries.partition_point(|(_, v)| self.order.compare(v, value) == Ordering::Less);
        let hi = lo
            + entries[lo..]
                .partition_point(|(_, v)| self.order.compare(v, value) != Ordering::Greater);
        (lo, hi)
    }

    fn remove_from(&self, entries: &mut Entries<KC::Key, VC::Value>, key: &KC::Key, old: &VC::Value) -> bool {
        let (lo, hi) = self.equal_range(entries, old);
        match entries[lo..hi].iter().position(|(k, _)| k == key) {
            Some(offset) => {
                entries.remove(lo + offset);
                true
            }
            None => false,
        }
    }

    fn insert_into(
        &self,
        storage: &KeyValueStorage<KC, VC>,
        entries: &mut Entries<KC::Key, VC::Value>,
        key: &KC::Key,
    ) -> bool {
        let Some(value) = storage.get(key) else {
            return false;
        };
        if !self.filter.matches(key, &value) {
            return false;
        }
        let (lo, hi) = self.equal_range(entries, &value);
        // Ties are ordered by cache position.
        let rank = storage.position(key);
        let at = lo + entries[lo..hi].partition_point(|(k, _)| storage.position(k) < rank);
        entries.insert(at, (key.clone(), value));
        true
    }

    /// Apply one change incrementally; `old` is the previous value if the
    /// key was cached before.
    fn patch(&self, key: &KC::Key, old: Option<&VC::Value>, reinsert: bool) {
        let Some(storage) = self.storage.upgrade() else {
            return;
        };
        let mut entries = self.items.with(|items| Vec::clone(items));
        let removed = old.is_some_and(|old| self.remove_from(&mut entries, key, old));
        let inserted = reinsert && self.insert_into(&storage, &mut entries, key);
        if removed || inserted {
            trace!(base = %storage.base(), removed, inserted, "projection patched");
            self.items.set(Rc::new(entries));
        }
    }
}

impl<KC, VC> ChangeListener<KC::Key, VC::Value> for Projector<KC, VC>
where
    KC: KeyCodec + 'static,
    VC: ValueCodec + 'static,
    KC::Key: Clone + PartialEq + 'static,
    VC::Value: 'static,
{
    fn on_create(&self, key: &KC::Key, _value: &VC::Value) {
        match self.mode {
            ProjectionMode::Rebuild => self.rebuild(),
            ProjectionMode::Incremental => self.patch(key, None, true),
        }
    }

    fn on_update(&self, key: &KC::Key, old: &VC::Value, _new: &VC::Value) {
        match self.mode {
            ProjectionMode::Rebuild => self.rebuild(),
            ProjectionMode::Incremental => self.patch(key, Some(old), true),
        }
    }

    fn on_delete(&self, key: &KC::Key, old: &VC::Value) {
        match self.mode {
            ProjectionMode::Rebuild => self.rebuild(),
            ProjectionMode::Incremental => self.patch(key, Some(old), false),
        }
    }
}
