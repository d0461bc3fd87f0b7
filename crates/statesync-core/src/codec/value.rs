// ── Value codecs ──
//
// Domain value ⇄ JSON tree. A missing or null remote document is never fed
// to `decode`. The object adapter asks `decode_absent` instead; the
// key-value adapter always treats a null child as a deletion.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{DecodeError, EncodeError};

/// Converts a domain value to and from a JSON tree.
pub trait ValueCodec {
    type Value;

    fn encode(&self, value: &Self::Value) -> Result<Value, EncodeError>;

    /// Decode a present, non-null document.
    fn decode(&self, raw: &Value) -> Result<Self::Value, DecodeError>;

    /// What an absent/null single document decodes to; `None` means absent.
    ///
    /// Only [`ObjectStorage`](crate::ObjectStorage) consults this. Null
    /// children of a collection are tombstones and always delete.
    fn decode_absent(&self) -> Option<Self::Value> {
        None
    }
}

/// Serde-backed codec for any `Serialize + DeserializeOwned` type.
pub struct JsonCodec<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for JsonCodec<T> {}

impl<T> std::fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T: Serialize + DeserializeOwned> ValueCodec for JsonCodec<T> {
    type Value = T;

    fn encode(&self, value: &T) -> Result<Value, EncodeError> {
        serde_json::to_value(value).map_err(|e| EncodeError::new(e.to_string()))
    }

    fn decode(&self, raw: &Value) -> Result<T, DecodeError> {
        T::deserialize(raw).map_err(|e| DecodeError::new(e.to_string()))
    }
}

/// Pass-through codec for untyped documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawJson;

impl ValueCodec for RawJson {
    type Value = Value;

    fn encode(&self, value: &Value) -> Result<Value, EncodeError> {
        Ok(value.clone())
    }

    fn decode(&self, raw: &Value) -> Result<Value, DecodeError> {
        Ok(raw.clone())
    }
}

/// Wraps a codec so that an absent document decodes to
/// `Default::default()` instead of `None`.
///
/// Meant for [`ObjectStorage`](crate::ObjectStorage). In a
/// [`KeyValueStorage`](crate::KeyValueStorage) it has no effect on
/// tombstones, which still delete their entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOnAbsent<C>(pub C);

impl<C> ValueCodec for DefaultOnAbsent<C>
where
    C: ValueCodec,
    C::Value: Default,
{
    type Value = C::Value;

    fn encode(&self, value: &C::Value) -> Result<Value, EncodeError> {
        self.0.encode(value)
    }

    fn decode(&self, raw: &Value) -> Result<C::Value, DecodeError> {
        self.0.decode(raw)
    }

    fn decode_absent(&self) -> Option<C::Value> {
        Some(C::Value::default())
    }
}

/// Codec built from a pair of closures.
pub struct FnValueCodec<V, E, D> {
    encode: E,
    decode: D,
    _value: PhantomData<fn() -> V>,
}

impl<V, E, D> FnValueCodec<V, E, D>
where
    E: Fn(&V) -> Result<Value, EncodeError>,
    D: Fn(&Value) -> Result<V, DecodeError>,
{
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            _value: PhantomData,
        }
    }
}

impl<V, E, D> ValueCodec for FnValueCodec<V, E, D>
where
    E: Fn(&V) -> Result<Value, EncodeError>,
    D: Fn(&Value) -> Result<V, DecodeError>,
{
    type Value = V;

    fn encode(&self, value: &V) -> Result<Value, EncodeError> {
        (self.encode)(value)
    }

    fn decode(&self, raw: &Value) -> Result<V, DecodeError> {
        (self.decode)(raw)
    }
}
