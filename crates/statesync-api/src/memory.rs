//! In-process reference store.
//!
//! [`MemoryStore`] keeps the whole tree as one `serde_json::Value` and
//! behaves the way a hosted realtime database does: writing `null` deletes,
//! objects left empty by a write disappear, and subscribers receive diffs of
//! what they watch in key order. Test controls let callers take the store
//! offline or interrupt individual subscriptions.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::error::Error;
use crate::path::Path;
use crate::store::{
    ChildEvent, ChildSubscription, RemoteStore, RemoteSubscription, StoreFuture, ValueEvent,
    ValueSubscription,
};

/// An in-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    root: Value,
    offline: Option<String>,
    children: Vec<ChildSubscriber>,
    values: Vec<ValueSubscriber>,
}

#[derive(Debug)]
struct ChildSubscriber {
    base: Path,
    tx: mpsc::UnboundedSender<ChildEvent>,
}

#[derive(Debug)]
struct ValueSubscriber {
    path: Path,
    tx: mpsc::UnboundedSender<ValueEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with `root` as the whole tree.
    pub fn from_json(root: Value) -> Result<Self, Error> {
        validate_keys(&Path::root(), &root)?;
        Ok(Self {
            state: Mutex::new(StoreState {
                root: normalize(root),
                ..StoreState::default()
            }),
        })
    }

    /// Build a store from a JSON seed document.
    pub fn from_json_str(body: &str) -> Result<Self, Error> {
        let root = serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        })?;
        Self::from_json(root)
    }

    /// Build a store from a JSON seed file on disk.
    pub fn load(file: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let body = std::fs::read_to_string(file)?;
        Self::from_json_str(&body)
    }

    /// A copy of the whole tree (`Value::Null` when empty).
    pub async fn snapshot(&self) -> Value {
        self.state.lock().await.root.clone()
    }

    // ── Test controls ────────────────────────────────────────────────

    /// Take the store offline (`Some(reason)`) or back online (`None`).
    ///
    /// Going offline interrupts every live subscription; while offline all
    /// operations fail with [`Error::Unavailable`].
    pub async fn set_offline(&self, reason: Option<String>) {
        let mut state = self.state.lock().await;
        if let Some(ref reason) = reason {
            for sub in state.children.drain(..) {
                let _ = sub.tx.send(ChildEvent::Interrupted {
                    reason: reason.clone(),
                });
            }
            for sub in state.values.drain(..) {
                let _ = sub.tx.send(ValueEvent::Interrupted {
                    reason: reason.clone(),
                });
            }
        }
        state.offline = reason;
    }

    /// Interrupt every subscription watching exactly `path`.
    ///
    /// Returns how many subscriptions were dropped.
    pub async fn interrupt(&self, path: &Path, reason: &str) -> usize {
        let mut state = self.state.lock().await;
        let before = state.children.len() + state.values.len();

        state.children.retain(|sub| {
            if sub.base == *path {
                let _ = sub.tx.send(ChildEvent::Interrupted {
                    reason: reason.to_owned(),
                });
                false
            } else {
                true
            }
        });
        state.values.retain(|sub| {
            if sub.path == *path {
                let _ = sub.tx.send(ValueEvent::Interrupted {
                    reason: reason.to_owned(),
                });
                false
            } else {
                true
            }
        });

        before - (state.children.len() + state.values.len())
    }

    /// Number of subscriptions whose receiver is still alive.
    pub async fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.children.retain(|sub| !sub.tx.is_closed());
        state.values.retain(|sub| !sub.tx.is_closed());
        state.children.len() + state.values.len()
    }
}

impl StoreState {
    fn check_online(&self) -> Result<(), Error> {
        match self.offline {
            Some(ref reason) => Err(Error::Unavailable {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Write `value` at `path` and push diffs to every overlapping subscriber.
    fn apply(&mut self, path: &Path, value: Value) {
        let children_before: Vec<Option<Map<String, Value>>> = self
            .children
            .iter()
            .map(|sub| {
                sub.base
                    .overlaps(path)
                    .then(|| children_of(&self.root, &sub.base))
            })
            .collect();
        let values_before: Vec<Option<Value>> = self
            .values
            .iter()
            .map(|sub| sub.path.overlaps(path).then(|| document_at(&self.root, &sub.path)))
            .collect();

        write_at(&mut self.root, path.segments(), value);

        let mut kept = Vec::with_capacity(self.children.len());
        for (sub, before) in std::mem::take(&mut self.children)
            .into_iter()
            .zip(children_before)
        {
            let alive = match before {
                Some(before) => {
                    let after = children_of(&self.root, &sub.base);
                    let touched = touched_child(&sub.base, path);
                    diff_children(&before, &after, touched)
                        .into_iter()
                        .all(|event| sub.tx.send(event).is_ok())
                }
                None => !sub.tx.is_closed(),
            };
            if alive {
                kept.push(sub);
            } else {
                debug!(base = %sub.base, "dropping closed child subscription");
            }
        }
        self.children = kept;

        let mut kept = Vec::with_capacity(self.values.len());
        for (sub, before) in std::mem::take(&mut self.values)
            .into_iter()
            .zip(values_before)
        {
            let alive = match before {
                Some(before) => {
                    let after = document_at(&self.root, &sub.path);
                    before == after || sub.tx.send(ValueEvent::Value(after)).is_ok()
                }
                None => !sub.tx.is_closed(),
            };
            if alive {
                kept.push(sub);
            } else {
                debug!(path = %sub.path, "dropping closed value subscription");
            }
        }
        self.values = kept;
    }
}

impl RemoteStore for MemoryStore {
    fn get<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check_online()?;
            Ok(lookup(&state.root, path).cloned())
        })
    }

    fn set<'a>(&'a self, path: &'a Path, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            validate_keys(path, &value)?;
            let mut state = self.state.lock().await;
            state.check_online()?;
            state.apply(path, normalize(value));
            Ok(())
        })
    }

    fn subscribe_children<'a>(&'a self, base: &'a Path) -> StoreFuture<'a, ChildSubscription> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check_online()?;

            let (tx, rx) = mpsc::unbounded_channel();
            for (key, value) in children_of(&state.root, base) {
                let _ = tx.send(ChildEvent::Added { key, value });
            }
            let _ = tx.send(ChildEvent::Synced);

            state.children.push(ChildSubscriber {
                base: base.clone(),
                tx,
            });
            debug!(base = %base, "child subscription opened");
            Ok(RemoteSubscription::new(base.clone(), rx))
        })
    }

    fn subscribe_value<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, ValueSubscription> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check_online()?;

            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(ValueEvent::Value(document_at(&state.root, path)));

            state.values.push(ValueSubscriber {
                path: path.clone(),
                tx,
            });
            debug!(path = %path, "value subscription opened");
            Ok(RemoteSubscription::new(path.clone(), rx))
        })
    }
}

// ── Tree helpers ────────────────────────────────────────────────────

fn lookup<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.get(segment.as_str()))
        .filter(|value| !value.is_null())
}

fn document_at(root: &Value, path: &Path) -> Value {
    lookup(root, path).cloned().unwrap_or(Value::Null)
}

fn children_of(root: &Value, base: &Path) -> Map<String, Value> {
    match lookup(root, base) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// Drop nulls and empty objects so that "absent" has one representation.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .filter(|(_, value)| !value.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

fn validate_keys(at: &Path, value: &Value) -> Result<(), Error> {
    if let Value::Object(map) = value {
        for (key, child) in map {
            validate_keys(&at.child(key)?, child)?;
        }
    }
    Ok(())
}

fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    let now_empty = match node {
        Value::Object(map) => {
            let child = map.entry(head.clone()).or_insert(Value::Null);
            write_at(child, rest, value);
            if child.is_null() {
                map.remove(head);
            }
            map.is_empty()
        }
        _ => false,
    };
    if now_empty {
        *node = Value::Null;
    }
}

/// The child of `base` a write at `path` lands in, if it lands below `base`.
fn touched_child<'a>(base: &Path, path: &'a Path) -> Option<&'a str> {
    if !path.starts_with(base) {
        return None;
    }
    path.segments()
        .get(base.segments().len())
        .map(String::as_str)
}

/// Child events turning `before` into `after`, in key order.
///
/// The child a write landed in is reported as `Changed` even when its
/// value did not change, so every write to a child is echoed.
fn diff_children(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    touched: Option<&str>,
) -> Vec<ChildEvent> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter_map(|key| match (before.get(key), after.get(key)) {
            (None, Some(value)) => Some(ChildEvent::Added {
                key: key.clone(),
                value: value.clone(),
            }),
            (Some(old), Some(new)) if old != new || touched == Some(key.as_str()) => {
                Some(ChildEvent::Changed {
                    key: key.clone(),
                    value: new.clone(),
                })
            }
            (Some(_), None) => Some(ChildEvent::Removed { key: key.clone() }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn write_at_creates_intermediate_objects() {
        let mut root = Value::Null;
        write_at(
            &mut root,
            Path::parse("a/b/c").unwrap().segments(),
            json!(1),
        );
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn write_null_prunes_empty_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "d": 2});
        write_at(
            &mut root,
            Path::parse("a/b/c").unwrap().segments(),
            Value::Null,
        );
        assert_eq!(root, json!({"d": 2}));
    }

    #[test]
    fn write_below_scalar_replaces_it() {
        let mut root = json!({"a": 5});
        write_at(&mut root, Path::parse("a/b").unwrap().segments(), json!(true));
        assert_eq!(root, json!({"a": {"b": true}}));
    }

    #[test]
    fn normalize_drops_nulls_and_empty_objects() {
        let value = normalize(json!({"a": null, "b": {}, "c": {"d": null}, "e": [1, null]}));
        assert_eq!(value, json!({"e": [1, null]}));
        assert_eq!(normalize(json!({})), Value::Null);
    }

    #[test]
    fn diff_children_orders_by_key() {
        let before = json!({"a": 1, "b": 2, "c": 3});
        let after = json!({"b": 2, "c": 4, "d": 5});
        let events = diff_children(
            before.as_object().unwrap(),
            after.as_object().unwrap(),
            None,
        );
        assert_eq!(
            events,
            vec![
                ChildEvent::Removed { key: "a".into() },
                ChildEvent::Changed {
                    key: "c".into(),
                    value: json!(4)
                },
                ChildEvent::Added {
                    key: "d".into(),
                    value: json!(5)
                },
            ]
        );
    }

    #[test]
    fn touched_child_is_echoed_even_when_unchanged() {
        let doc = json!({"a": 1, "b": 2});
        let map = doc.as_object().unwrap();
        assert_eq!(
            diff_children(map, map, Some("b")),
            vec![ChildEvent::Changed {
                key: "b".into(),
                value: json!(2)
            }]
        );
        let base = Path::parse("items").unwrap();
        let path = Path::parse("items/b/score").unwrap();
        assert_eq!(touched_child(&base, &path), Some("b"));
        assert_eq!(touched_child(&base, &base), None);
        assert_eq!(touched_child(&path, &base), None);
    }

    #[test]
    fn lookup_treats_null_as_absent() {
        let root = json!({"a": {"b": null}});
        assert!(lookup(&root, &Path::parse("a/b").unwrap()).is_none());
        assert!(lookup(&root, &Path::parse("a/b/c").unwrap()).is_none());
        assert_eq!(
            lookup(&root, &Path::parse("a").unwrap()),
            Some(&json!({"b": null}))
        );
    }
}
