//! Reactive game-state layer between `statesync-api` and presentation.
//!
//! This crate keeps a typed, in-memory copy of remotely stored state
//! consistent with a tree-structured JSON store, and exposes it as
//! observable values:
//!
//! - **[`Property`]**: single-value holder with synchronous, ordered
//!   `(old, new)` notification. [`derive`](ReadOnlyProperty::derive) builds
//!   read-only [`Derived`] properties; [`watch`](ReadOnlyProperty::watch)
//!   bridges into async code via [`PropertyStream`].
//!
//! - **[`KeyValueStorage`]**: binds the children of one remote path to a
//!   typed cache and fans out create/update/delete callbacks to
//!   [`ChangeListener`]s. Local writes round-trip through the store.
//!
//! - **[`ObjectStorage`]**: the same pattern for a single document.
//!
//! - **[`CollectionProjection`]**: a sorted, filtered, observable sequence
//!   maintained from a key-value adapter.
//!
//! - **Codecs** ([`codec`]): explicit key and value codecs chosen when an
//!   adapter is built; [`JsonCodec`] covers any serde type.
//!
//! - **[`Connection`]**: the explicit handle to the remote store that every
//!   adapter is opened through. Shutting it down cancels all adapters.
//!
//! Properties, adapters and listeners are `!Send`. Remote events queue up
//! on channels and are applied on the owning thread by `pump()` or `run()`.

// Adapter futures hold `Rc` state and are never `Send`.
#![allow(clippy::future_not_send)]

pub mod codec;
pub mod connection;
pub mod error;
pub mod listener;
pub mod model;
pub mod projection;
pub mod property;
pub mod storage;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use codec::{
    AccountIdKey, DecodeError, DefaultOnAbsent, EncodeError, FnKeyCodec, FnValueCodec, JsonCodec,
    KeyCodec, ParseKey, RawJson, StringKey, ValueCodec,
};
pub use connection::{Connection, ConnectionConfig};
pub use error::CoreError;
pub use listener::{ListenerId, ListenerRegistry, Subscription};
pub use model::{AccountId, GameSettings, Player};
pub use projection::{CollectionProjection, Filter, Items, Order, ProjectionBuilder, ProjectionMode};
pub use property::{Derived, Property, ReadOnlyProperty};
pub use storage::{
    Change, ChangeListener, FnListener, KeyValueStorage, ObjectStorage, Snapshot, SyncState,
};
pub use stream::{PropertyStream, PropertyWatchStream};

// Transport types adapters are addressed with.
pub use statesync_api::{MemoryStore, Path, RemoteStore};
