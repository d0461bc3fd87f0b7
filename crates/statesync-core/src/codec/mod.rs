//! Key and value codecs.
//!
//! Adapters never inspect domain types directly. Each adapter is built with
//! one [`KeyCodec`] (domain key ⇄ path segment) and one [`ValueCodec`]
//! (domain value ⇄ JSON tree), chosen at compile time.

mod key;
mod value;

use thiserror::Error;

pub use key::{AccountIdKey, FnKeyCodec, KeyCodec, ParseKey, StringKey};
pub use value::{DefaultOnAbsent, FnValueCodec, JsonCodec, RawJson, ValueCodec};

/// A raw key or value could not be turned into its domain type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A domain value could not be turned into JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct EncodeError {
    reason: String,
}

impl EncodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
