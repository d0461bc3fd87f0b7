//! Remote store boundary for statesync.
//!
//! The core crate never talks to a concrete database. It sees a tree of JSON
//! documents addressed by `/`-separated [`Path`]s through the [`RemoteStore`]
//! trait:
//!
//! - **[`RemoteStore`]**: `get` / `set` plus two push subscriptions:
//!   [`subscribe_children`](RemoteStore::subscribe_children) (one event per
//!   child added, changed or removed under a base path) and
//!   [`subscribe_value`](RemoteStore::subscribe_value) (the whole document at
//!   one path).
//!
//! - **[`MemoryStore`]**: in-process implementation with the same semantics
//!   as a hosted realtime database: nulls delete, empty objects vanish, and
//!   subscribers receive diffs in key order. Used by tests and the CLI.

pub mod error;
pub mod memory;
pub mod path;
pub mod store;

pub use error::Error;
pub use memory::MemoryStore;
pub use path::{Path, validate_segment};
pub use store::{
    ChildEvent, ChildSubscription, RemoteStore, RemoteSubscription, StoreFuture, TryRecv,
    ValueEvent, ValueSubscription,
};
