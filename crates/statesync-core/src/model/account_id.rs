// ── Account identifiers ──
//
// 64-bit ids exceed the integer range JSON consumers can represent exactly,
// so they are stored as decimal strings everywhere: as values and as path
// segments.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A player account identifier.
///
/// Serializes as a decimal string (`"123456789012345678"`), never as a JSON
/// number. Deserialization also accepts unsigned integers for leniency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(u64);

impl AccountId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u64> for AccountId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AccountIdVisitor;

        impl Visitor<'_> for AccountIdVisitor {
            type Value = AccountId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal account id string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<AccountId, E> {
                v.parse()
                    .map_err(|e| E::custom(format!("invalid account id '{v}': {e}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<AccountId, E> {
                Ok(AccountId(v))
            }
        }

        deserializer.deserialize_any(AccountIdVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_as_decimal_string() {
        let id = AccountId::new(123_456_789_012_345_678);
        assert_eq!(serde_json::to_value(id).unwrap(), json!("123456789012345678"));
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"123456789012345678\""
        );
    }

    #[test]
    fn round_trips_beyond_f64_precision() {
        for raw in [0, 9_007_199_254_740_993, u64::MAX] {
            let id = AccountId::new(raw);
            let json = serde_json::to_value(id).unwrap();
            assert_eq!(serde_json::from_value::<AccountId>(json).unwrap(), id);
        }
    }

    #[test]
    fn accepts_numbers_leniently() {
        let id: AccountId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_value::<AccountId>(json!("12ab")).is_err());
        assert!(serde_json::from_value::<AccountId>(json!(-1)).is_err());
        assert!(serde_json::from_value::<AccountId>(json!(1.5)).is_err());
    }

    #[test]
    fn from_str_and_display_agree() {
        let id: AccountId = "987654321".parse().unwrap();
        assert_eq!(id.to_string(), "987654321");
    }
}
