// ── Change listener registry ──
//
// Ordered listener set shared by properties and storage adapters. Dispatch
// iterates a snapshot taken at the start of the round and re-checks
// membership before every call, so listeners may add or remove themselves
// (or each other) from inside a callback.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Compact once at least this many slots exist and fewer than half are live.
const COMPACT_THRESHOLD: usize = 16;

/// Handle returned by `add`, used to remove a listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Registration-ordered set of listeners of type `L` (usually `dyn Fn..`).
///
/// `add` is O(1) amortized; `remove` and the per-call membership check are
/// O(log n) because ids are issued in increasing order and slots stay
/// sorted. Removed slots are tombstoned and compacted lazily.
pub struct ListenerRegistry<L: ?Sized> {
    slots: RefCell<Slots<L>>,
}

struct Slots<L: ?Sized> {
    entries: Vec<(ListenerId, Option<Rc<L>>)>,
    live: usize,
    next_id: u64,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Slots {
                entries: Vec::new(),
                live: 0,
                next_id: 0,
            }),
        }
    }

    /// Register a listener; it is called from the next dispatch round on.
    pub fn add(&self, listener: Rc<L>) -> ListenerId {
        let mut slots = self.slots.borrow_mut();
        let id = ListenerId(slots.next_id);
        slots.next_id += 1;
        slots.entries.push((id, Some(listener)));
        slots.live += 1;
        id
    }

    /// Deregister a listener. Returns `false` if it was not registered.
    ///
    /// Takes effect immediately, including for a dispatch in progress.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let Ok(index) = slots.entries.binary_search_by_key(&id, |(slot_id, _)| *slot_id) else {
            return false;
        };
        let removed = slots
            .entries
            .get_mut(index)
            .and_then(|(_, listener)| listener.take())
            .is_some();
        if removed {
            slots.live -= 1;
            if slots.entries.len() >= COMPACT_THRESHOLD && slots.live * 2 < slots.entries.len() {
                slots.entries.retain(|(_, listener)| listener.is_some());
            }
        }
        removed
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        let slots = self.slots.borrow();
        slots
            .entries
            .binary_search_by_key(&id, |(slot_id, _)| *slot_id)
            .ok()
            .and_then(|index| slots.entries.get(index))
            .is_some_and(|(_, listener)| listener.is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let mut slots = self.slots.borrow_mut();
        slots.entries.clear();
        slots.live = 0;
    }

    /// Live listeners in registration order.
    pub fn snapshot(&self) -> Vec<(ListenerId, Rc<L>)> {
        self.slots
            .borrow()
            .entries
            .iter()
            .filter_map(|(id, listener)| listener.as_ref().map(|l| (*id, Rc::clone(l))))
            .collect()
    }

    /// Run one dispatch round.
    ///
    /// Listeners added during the round are skipped; listeners removed
    /// during the round are not called after their removal.
    pub fn dispatch(&self, mut call: impl FnMut(&L)) {
        for (id, listener) in self.snapshot() {
            if self.contains(id) {
                call(&listener);
            }
        }
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// RAII registration handle.
///
/// [`close`](Self::close) (or dropping the handle) deregisters the listener;
/// no callback is delivered after it returns.
#[must_use = "dropping a Subscription deregisters its listener immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub(crate) fn empty() -> Self {
        Self { cancel: None }
    }

    pub fn close(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    type Callback = dyn Fn(&str);

    fn recorder(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> Rc<Callback> {
        let log = Rc::clone(log);
        Rc::new(move |event: &str| log.borrow_mut().push(format!("{name}:{event}")))
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        registry.add(recorder(&log, "a"));
        registry.add(recorder(&log, "b"));
        registry.add(recorder(&log, "c"));

        registry.dispatch(|l| l("x"));
        assert_eq!(*log.borrow(), ["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn remove_reports_membership() {
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        let id = registry.add(Rc::new(|_: &str| {}));
        assert!(registry.contains(id));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn removal_during_dispatch_skips_later_listener() {
        let registry: Rc<ListenerRegistry<Callback>> = Rc::new(ListenerRegistry::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim = Rc::new(Cell::new(None));

        {
            let registry2 = Rc::clone(&registry);
            let victim = Rc::clone(&victim);
            registry.add(Rc::new(move |_: &str| {
                if let Some(id) = victim.get() {
                    registry2.remove(id);
                }
            }));
        }
        victim.set(Some(registry.add(recorder(&log, "victim"))));
        registry.add(recorder(&log, "after"));

        registry.dispatch(|l| l("x"));
        assert_eq!(*log.borrow(), ["after:x"]);
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_round() {
        let registry: Rc<ListenerRegistry<Callback>> = Rc::new(ListenerRegistry::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::new(Cell::new(false));

        {
            let registry2 = Rc::clone(&registry);
            let log = Rc::clone(&log);
            let added = Rc::clone(&added);
            registry.add(Rc::new(move |_: &str| {
                if !added.replace(true) {
                    registry2.add(recorder(&log, "late"));
                }
            }));
        }

        registry.dispatch(|l| l("1"));
        assert!(log.borrow().is_empty());
        registry.dispatch(|l| l("2"));
        assert_eq!(*log.borrow(), ["late:2"]);
    }

    #[test]
    fn compaction_preserves_order_and_ids() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        let ids: Vec<ListenerId> = (0..20)
            .map(|_| registry.add(Rc::new(|_: &str| {})))
            .collect();
        let keep = registry.add(recorder(&log, "keep"));
        for id in &ids {
            registry.remove(*id);
        }
        let tail = registry.add(recorder(&log, "tail"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(keep));
        assert!(registry.contains(tail));
        registry.dispatch(|l| l("x"));
        assert_eq!(*log.borrow(), ["keep:x", "tail:x"]);
    }

    #[test]
    fn subscription_close_and_drop_both_cancel() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        Subscription::new(move || c.set(c.get() + 1)).close();
        let c = Rc::clone(&count);
        drop(Subscription::new(move || c.set(c.get() + 1)));
        assert_eq!(count.get(), 2);
    }
}
