// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native values carried in and out of command arguments and responses.

use std::collections::BTreeMap;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use num_bigint::BigInt;

use crate::decimal::Decimal;

/// A decoded argument or response value.
#[derive(Debug, Clone)]
pub enum Value {
    /// An optional slot that was not present on the wire.
    Absent,
    Integer(BigInt),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Float(f64),
    Decimal(Decimal),
    Timestamp(DateTime<FixedOffset>),
    /// A timestamp without an offset; it cannot be sent.
    NaiveTimestamp(NaiveDateTime),
    Path(PathBuf),
    List(Vec<Value>),
    Boxes(Vec<Values>),
    Descriptor(Arc<OwnedFd>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Integer(_) => "integer",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
            Self::NaiveTimestamp(_) => "naive timestamp",
            Self::Path(_) => "path",
            Self::List(_) => "list",
            Self::Boxes(_) => "boxes",
            Self::Descriptor(_) => "descriptor",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Self::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// The integer value, if it fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|n| i64::try_from(n).ok())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Self::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_boxes(&self) -> Option<&[Values]> {
        match self {
            Self::Boxes(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_descriptor(&self) -> Option<&Arc<OwnedFd>> {
        match self {
            Self::Descriptor(fd) => Some(fd),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            // Same instant and same offset.
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b && a.offset() == b.offset(),
            (Self::NaiveTimestamp(a), Self::NaiveTimestamp(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Boxes(a), Self::Boxes(b)) => a == b,
            (Self::Descriptor(a), Self::Descriptor(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(via $conv:path)?),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant($($conv)?(v))
                }
            }
        )+
    };
}

value_from! {
    BigInt => Integer,
    i64 => Integer via BigInt::from,
    i32 => Integer via BigInt::from,
    u64 => Integer via BigInt::from,
    u32 => Integer via BigInt::from,
    usize => Integer via BigInt::from,
    Vec<u8> => Bytes,
    String => Text,
    bool => Bool,
    f64 => Float,
    Decimal => Decimal,
    DateTime<FixedOffset> => Timestamp,
    NaiveDateTime => NaiveTimestamp,
    PathBuf => Path,
    Vec<Value> => List,
    Vec<Values> => Boxes,
    Arc<OwnedFd> => Descriptor,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<OwnedFd> for Value {
    fn from(fd: OwnedFd) -> Self {
        Self::Descriptor(Arc::new(fd))
    }
}

/// Named values: the native side of a request or response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    entries: BTreeMap<String, Value>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(name.into(), value.into())
    }

    /// The value for `name`; absent optional slots read as `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).filter(|v| !v.is_absent())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    /// Whether `name` has a slot, including an absent one.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
