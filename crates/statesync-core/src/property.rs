//! Observable properties.
//!
//! A [`Property`] holds one value and synchronously notifies its listeners
//! with `(old, new)` on every `set`, in registration order. Notification is
//! unconditional: setting a value equal to the current one still notifies,
//! because consumers use transitions as "something happened" signals.
//!
//! A `set` issued while the same property is notifying is queued and applied
//! after the current round, so listeners never observe interleaved rounds.
//!
//! [`derive`](ReadOnlyProperty::derive) produces a [`Derived`] property whose
//! value is always `f(source)`. If `f` panics, the panic unwinds out of the
//! `set` that triggered it and the derived property keeps its last good
//! value; the source stays usable.
//!
//! Everything here is `!Send`: properties live on the single logical thread
//! that owns the presentation state.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tokio::sync::watch;

use crate::listener::{ListenerId, ListenerRegistry, Subscription};
use crate::stream::PropertyStream;

type Listener<T> = dyn Fn(&T, &T);

enum Pending<T> {
    Set(T),
    Map(Box<dyn FnOnce(&T) -> T>),
}

struct PropertyInner<T> {
    value: RefCell<T>,
    listeners: ListenerRegistry<Listener<T>>,
    pending: RefCell<VecDeque<Pending<T>>>,
    dispatching: Cell<bool>,
}

impl<T> PropertyInner<T> {
    fn submit(&self, next: Pending<T>) {
        if self.dispatching.get() {
            self.pending.borrow_mut().push_back(next);
            return;
        }

        let _round = DispatchRound::enter(self);
        let mut next = Some(next);
        while let Some(pending) = next {
            let value = match pending {
                Pending::Set(value) => value,
                Pending::Map(f) => f(&self.value.borrow()),
            };
            let old = self.value.replace(value);
            {
                let current = self.value.borrow();
                self.listeners.dispatch(|listener| listener(&old, &current));
            }
            next = self.pending.borrow_mut().pop_front();
        }
    }
}

/// Marks a property as notifying; restores it even if a listener panics.
struct DispatchRound<'a, T> {
    inner: &'a PropertyInner<T>,
}

impl<'a, T> DispatchRound<'a, T> {
    fn enter(inner: &'a PropertyInner<T>) -> Self {
        inner.dispatching.set(true);
        Self { inner }
    }
}

impl<T> Drop for DispatchRound<'_, T> {
    fn drop(&mut self) {
        self.inner.dispatching.set(false);
        // Only non-empty when a listener panicked mid-round.
        if let Ok(mut pending) = self.inner.pending.try_borrow_mut() {
            pending.clear();
        }
    }
}

// ── ReadOnlyProperty ─────────────────────────────────────────────────

/// Read side of a property: observe, derive, but never set.
///
/// Cheap to clone; clones share the same value and listeners.
pub struct ReadOnlyProperty<T> {
    inner: Rc<PropertyInner<T>>,
}

impl<T: 'static> ReadOnlyProperty<T> {
    /// A clone of the current value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Register `listener` to receive `(old, new)` on every change.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + 'static) -> ListenerId {
        self.inner.listeners.add(Rc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Like [`add_listener`](Self::add_listener), but deregisters when the
    /// returned [`Subscription`] is closed or dropped.
    pub fn subscribe(&self, listener: impl Fn(&T, &T) + 'static) -> Subscription {
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

    /// Drop every listener, e.g. when the owning adapter closes.
    pub(crate) fn clear_listeners(&self) {
        self.inner.listeners.clear();
    }

    /// A read-only property whose value is always `f(self)`.
    ///
    /// `f` runs once now and again on every change of `self`.
    pub fn derive<U: 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Derived<U> {
        let target = Property::new(self.with(&f));
        let weak = Rc::downgrade(&target.view.inner);
        let link = self.subscribe(move |_, new| {
            if let Some(target) = weak.upgrade() {
                target.submit(Pending::Set(f(new)));
            }
        });
        Derived {
            view: target.read_only(),
            link: Rc::new(RefCell::new(Some(link))),
        }
    }

    /// Bridge this property into a `watch` channel for async consumers.
    pub fn watch(&self) -> PropertyStream<T>
    where
        T: Clone,
    {
        let (tx, rx) = watch::channel(self.get());
        let link = self.subscribe(move |_, new| {
            tx.send_replace(new.clone());
        });
        PropertyStream::new(rx, link)
    }

    /// `true` if both handles share the same underlying property.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for ReadOnlyProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Property");
        match self.inner.value.try_borrow() {
            Ok(value) => out.field("value", &*value),
            Err(_) => out.field("value", &"<borrowed>"),
        };
        out.field("listeners", &self.inner.listeners.len()).finish()
    }
}

// ── Property ─────────────────────────────────────────────────────────

/// A mutable observable value. Derefs to [`ReadOnlyProperty`] for reads.
pub struct Property<T> {
    view: ReadOnlyProperty<T>,
}

impl<T: 'static> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            view: ReadOnlyProperty {
                inner: Rc::new(PropertyInner {
                    value: RefCell::new(value),
                    listeners: ListenerRegistry::new(),
                    pending: RefCell::new(VecDeque::new()),
                    dispatching: Cell::new(false),
                }),
            },
        }
    }

    /// Replace the value and notify every listener.
    pub fn set(&self, value: T) {
        self.view.inner.submit(Pending::Set(value));
    }

    /// Set the value to a modified copy of itself.
    ///
    /// When called during notification, `f` runs against the value current
    /// at the time the queued update is applied.
    pub fn update(&self, f: impl FnOnce(&mut T) + 'static)
    where
        T: Clone,
    {
        self.view.inner.submit(Pending::Map(Box::new(move |current| {
            let mut next = current.clone();
            f(&mut next);
            next
        })));
    }

    /// A handle that can observe but not set.
    pub fn read_only(&self) -> ReadOnlyProperty<T> {
        self.view.clone()
    }
}

impl<T> Deref for Property<T> {
    type Target = ReadOnlyProperty<T>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
        }
    }
}

impl<T: Default + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.view.fmt(f)
    }
}

// ── Derived ──────────────────────────────────────────────────────────

/// A read-only property computed from another property.
///
/// Tracks its source until [`dispose`](Self::dispose) is called or the last
/// clone is dropped.
pub struct Derived<T> {
    view: ReadOnlyProperty<T>,
    link: Rc<RefCell<Option<Subscription>>>,
}

impl<T: 'static> Derived<T> {
    /// Stop tracking the source. The current value is kept.
    pub fn dispose(&self) {
        let link = self.link.borrow_mut().take();
        if let Some(link) = link {
            link.close();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.link.borrow().is_none()
    }

    pub fn read_only(&self) -> ReadOnlyProperty<T> {
        self.view.clone()
    }
}

impl<T> Deref for Derived<T> {
    type Target = ReadOnlyProperty<T>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            link: Rc::clone(&self.link),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.view.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use pretty_assertions::assert_eq;

    use super::*;

    fn log_changes<T: Clone + fmt::Debug + 'static>(
        prop: &ReadOnlyProperty<T>,
        name: &'static str,
        log: &Rc<RefCell<Vec<String>>>,
    ) -> ListenerId {
        let log = Rc::clone(log);
        prop.add_listener(move |old, new| {
            log.borrow_mut().push(format!("{name}:{old:?}->{new:?}"));
        })
    }

    #[test]
    fn set_notifies_listeners_in_order_with_old_and_new() {
        let prop = Property::new(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        log_changes(&prop, "a", &log);
        log_changes(&prop, "b", &log);

        prop.set(2);
        assert_eq!(prop.get(), 2);
        assert_eq!(*log.borrow(), ["a:1->2", "b:1->2"]);
    }

    #[test]
    fn setting_an_equal_value_still_notifies() {
        let prop = Property::new("same".to_owned());
        let log = Rc::new(RefCell::new(Vec::new()));
        log_changes(&prop, "l", &log);

        prop.set("same".to_owned());
        prop.set("same".to_owned());
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn derived_tracks_source_synchronously() {
        let source = Property::new(2);
        let doubled = source.derive(|x| x * 2);
        assert_eq!(doubled.get(), 4);

        let log = Rc::new(RefCell::new(Vec::new()));
        log_changes(&doubled, "d", &log);

        source.set(3);
        assert_eq!(doubled.get(), 6);
        assert_eq!(*log.borrow(), ["d:4->6"]);
    }

    #[test]
    fn derived_of_derived_chains() {
        let source = Property::new(1);
        let plus_one = source.derive(|x| x + 1);
        let label = plus_one.derive(|x| format!("#{x}"));
        source.set(41);
        assert_eq!(label.get(), "#42");
    }

    #[test]
    fn set_during_dispatch_is_queued_until_round_ends() {
        let prop = Property::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let handle = prop.clone();
            let log = Rc::clone(&log);
            prop.add_listener(move |old, new| {
                log.borrow_mut()
                    .push(format!("a:{old}->{new} sees {}", handle.get()));
                if *new == 1 {
                    handle.set(2);
                    handle.set(3);
                }
            });
        }
        log_changes(&prop, "b", &log);

        prop.set(1);
        assert_eq!(prop.get(), 3);
        assert_eq!(
            *log.borrow(),
            [
                "a:0->1 sees 1",
                "b:0->1",
                "a:1->2 sees 2",
                "b:1->2",
                "a:2->3 sees 3",
                "b:2->3",
            ]
        );
    }

    #[test]
    fn update_during_dispatch_sees_applied_value() {
        let prop = Property::new(1);
        {
            let handle = prop.clone();
            prop.add_listener(move |_, new| {
                if *new < 10 {
                    handle.update(|v| *v *= 10);
                }
            });
        }
        prop.set(2);
        assert_eq!(prop.get(), 20);
    }

    #[test]
    fn listener_removing_itself_is_not_called_again() {
        let prop = Property::new(0);
        let calls = Rc::new(Cell::new(0));
        let own_id = Rc::new(Cell::new(None));
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let handle = prop.read_only();
            let calls = Rc::clone(&calls);
            let own_id_inner = Rc::clone(&own_id);
            let id = prop.add_listener(move |_, _| {
                calls.set(calls.get() + 1);
                if let Some(id) = own_id_inner.get() {
                    assert!(handle.remove_listener(id));
                }
            });
            own_id.set(Some(id));
        }
        log_changes(&prop, "other", &log);

        prop.set(1);
        prop.set(2);
        assert_eq!(calls.get(), 1);
        assert_eq!(*log.borrow(), ["other:0->1", "other:1->2"]);
    }

    #[test]
    fn subscription_close_stops_delivery() {
        let prop = Property::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = {
            let log = Rc::clone(&log);
            prop.subscribe(move |_, new| log.borrow_mut().push(*new))
        };
        prop.set(1);
        sub.close();
        prop.set(2);
        assert_eq!(*log.borrow(), [1]);
        assert_eq!(prop.listener_count(), 0);
    }

    #[test]
    fn dispose_and_drop_unsubscribe_from_source() {
        let source = Property::new(1);
        let derived = source.derive(|x| x + 1);
        assert_eq!(source.listener_count(), 1);

        derived.dispose();
        assert!(derived.is_disposed());
        assert_eq!(source.listener_count(), 0);
        source.set(5);
        assert_eq!(derived.get(), 2);

        let dropped = source.derive(|x| x + 1);
        let clone = dropped.clone();
        drop(dropped);
        assert_eq!(source.listener_count(), 1);
        drop(clone);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn panicking_derive_keeps_last_good_value() {
        let source = Property::new(1);
        let derived = source.derive(|x: &i32| {
            assert!(*x >= 0, "negative input");
            x * 10
        });

        let result = catch_unwind(AssertUnwindSafe(|| source.set(-1)));
        assert!(result.is_err());
        assert_eq!(derived.get(), 10);
        assert_eq!(source.get(), -1);

        source.set(2);
        assert_eq!(derived.get(), 20);
    }

    #[test]
    fn read_only_handle_shares_state() {
        let prop = Property::new(vec![1]);
        let view = prop.read_only();
        prop.update(|v| v.push(2));
        assert_eq!(view.get(), vec![1, 2]);
        assert!(view.ptr_eq(&prop));
        assert_eq!(view.with(Vec::len), 2);
    }
}
