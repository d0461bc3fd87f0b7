// ── Key codecs ──
//
// Total, deterministic mappings between domain keys and the path segment a
// child is stored under.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use super::DecodeError;
use crate::model::AccountId;

/// Converts a domain key to and from its path segment.
///
/// `decode(encode(k)) == k` for every key, and `encode(decode(s)) == s`
/// for every segment this codec produced. Codecs may reject segments they
/// would never produce.
///
/// A codec that accepts several spellings of one key (say, any letter
/// case) maps them all to one cache entry under `encode(decode(s))`; the
/// adapter never keeps two entries for equal keys.
pub trait KeyCodec {
    type Key;

    fn encode(&self, key: &Self::Key) -> String;

    fn decode(&self, raw: &str) -> Result<Self::Key, DecodeError>;
}

/// Identity codec for string keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringKey;

impl KeyCodec for StringKey {
    type Key = String;

    fn encode(&self, key: &String) -> String {
        key.clone()
    }

    fn decode(&self, raw: &str) -> Result<String, DecodeError> {
        Ok(raw.to_owned())
    }
}

/// Codec for any key with a canonical `Display` / `FromStr` pair.
///
/// Decoding rejects non-canonical spellings (`"007"` for `7`) so that
/// re-encoding a decoded key always reproduces the stored segment.
pub struct ParseKey<T> {
    _key: PhantomData<fn() -> T>,
}

impl<T> ParseKey<T> {
    pub fn new() -> Self {
        Self { _key: PhantomData }
    }
}

impl<T> Default for ParseKey<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ParseKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ParseKey<T> {}

impl<T> std::fmt::Debug for ParseKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ParseKey")
    }
}

impl<T> KeyCodec for ParseKey<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    type Key = T;

    fn encode(&self, key: &T) -> String {
        key.to_string()
    }

    fn decode(&self, raw: &str) -> Result<T, DecodeError> {
        let key: T = raw
            .parse()
            .map_err(|e| DecodeError::new(format!("invalid key '{raw}': {e}")))?;
        if key.to_string() != raw {
            return Err(DecodeError::new(format!(
                "non-canonical key '{raw}' (expected '{key}')"
            )));
        }
        Ok(key)
    }
}

/// Account ids stored under their decimal representation.
pub type AccountIdKey = ParseKey<AccountId>;

/// Codec built from a pair of closures.
///
/// The closures must satisfy the [`KeyCodec`] round-trip laws; in
/// particular `encode` should produce the spelling `decode` was given for
/// every segment this system writes.
pub struct FnKeyCodec<K, E, D> {
    encode: E,
    decode: D,
    _key: PhantomData<fn() -> K>,
}

impl<K, E, D> FnKeyCodec<K, E, D>
where
    E: Fn(&K) -> String,
    D: Fn(&str) -> Result<K, DecodeError>,
{
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            _key: PhantomData,
        }
    }
}

impl<K, E, D> KeyCodec for FnKeyCodec<K, E, D>
where
    E: Fn(&K) -> String,
    D: Fn(&str) -> Result<K, DecodeError>,
{
    type Key = K;

    fn encode(&self, key: &K) -> String {
        (self.encode)(key)
    }

    fn decode(&self, raw: &str) -> Result<K, DecodeError> {
        (self.decode)(raw)
    }
}
