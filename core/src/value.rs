// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The dynamically-typed tree produced by decoding SCALE values against the
//! runtime's type registry.
//!
//! Wide integers (u64 and up) are carried as decimal strings so they
//! survive the trip through JSON unharmed; byte blobs are carried as
//! `0x`-prefixed hex. Map entries keep their declaration order and only
//! become stringified JSON keys at the store boundary.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// One node of a decoded value tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Nothing; the unit type and empty tuples decode to this.
    Null,
    /// A boolean.
    Bool(bool),
    /// An unsigned integer no wider than 32 bits on the wire.
    U64(u64),
    /// A signed integer no wider than 32 bits on the wire.
    I64(i64),
    /// A wide integer (u64/u128/u256/i64/i128) as a decimal string.
    BigNum(String),
    /// A UTF-8 string or char.
    Str(String),
    /// Raw bytes as `0x`-prefixed lowercase hex.
    Hex(String),
    /// An ordered sequence: Vec, array or tuple contents.
    List(Vec<Value>),
    /// Named fields or an enum variant, in declaration order.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Wrap raw bytes as a [`Value::Hex`] node.
    pub fn hex(bytes: impl AsRef<[u8]>) -> Value {
        Value::Hex(crate::to_hex(bytes))
    }

    /// A single-entry map, used for enum variants wrapping one value.
    pub fn entry(key: impl Into<String>, value: Value) -> Value {
        Value::Map(vec![(key.into(), value)])
    }

    /// Look up a key if this node is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Positional lookup if this node is a list.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List(items) => items.get(index),
            _ => None,
        }
    }

    /// The value as a decimal string, if it is any kind of integer.
    pub fn as_decimal(&self) -> Option<String> {
        match self {
            Value::U64(n) => Some(n.to_string()),
            Value::I64(n) => Some(n.to_string()),
            Value::BigNum(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// The value as a `u64`, if it is an unsigned integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(n) => Some(*n),
            Value::BigNum(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The value as a string slice, for [`Value::Str`] and [`Value::Hex`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Hex(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::U64(n) => serializer.serialize_u64(*n),
            Value::I64(n) => serializer.serialize_i64(*n),
            Value::BigNum(s) | Value::Str(s) | Value::Hex(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_to_expected_json() {
        let value = Value::Map(vec![
            ("dest".into(), Value::hex([0xab; 4])),
            ("value".into(), Value::BigNum("12345678901234567890".into())),
            ("keep_alive".into(), Value::Bool(true)),
            ("memo".into(), Value::Null),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"dest":"0xabababab","value":"12345678901234567890","keep_alive":true,"memo":null}"#
        );
    }

    #[test]
    fn map_order_is_declaration_order() {
        let value = Value::Map(vec![
            ("z".into(), Value::U64(1)),
            ("a".into(), Value::U64(2)),
        ]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn accessors() {
        let value = Value::entry("Transfer", Value::List(vec![Value::U64(7)]));
        assert_eq!(value.get("Transfer").unwrap().at(0), Some(&Value::U64(7)));
        assert_eq!(Value::BigNum("42".into()).as_u64(), Some(42));
        assert_eq!(Value::U64(9).as_decimal().unwrap(), "9");
    }
}
