// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed argument codecs.
//!
//! Every codec turns one native [`Value`] into the byte string stored under
//! its name in a box, and back. Optional arguments may be missing entirely:
//! encoding skips them and decoding records [`Value::Absent`].

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use num_bigint::BigInt;

use crate::amp_box::{parse_boxes, AmpBox};
use crate::decimal::Decimal;
use crate::error::{BoxError, CodecError};
use crate::keys::MAX_VALUE_LENGTH;
use crate::value::{Value, Values};

/// Length of every encoded timestamp: `YYYY-MM-DDTHH:MM:SS.ffffff+HH:MM`.
pub const TIMESTAMP_LENGTH: usize = 32;

/// Connection services needed by codecs that do not travel inline.
pub trait CodecContext {
    /// Queue `fd` for out-of-band transfer and return its send ordinal.
    fn send_descriptor(&mut self, fd: BorrowedFd<'_>) -> Result<u64, String>;

    /// Claim the descriptor received out-of-band with the given ordinal.
    fn receive_descriptor(&mut self, ordinal: u64) -> Result<OwnedFd, String>;
}

/// Context for connections (or offline parsing) without descriptor passing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDescriptors;

impl CodecContext for NoDescriptors {
    fn send_descriptor(&mut self, _fd: BorrowedFd<'_>) -> Result<u64, String> {
        Err("descriptor passing is not available on this connection".to_string())
    }

    fn receive_descriptor(&mut self, _ordinal: u64) -> Result<OwnedFd, String> {
        Err("descriptor passing is not available on this connection".to_string())
    }
}

/// The wire representation used by an argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentKind {
    /// Decimal ASCII, arbitrary precision.
    Integer,
    /// Raw bytes, passed through unchanged.
    Bytes,
    /// UTF-8 text.
    Text,
    /// `True` or `False`.
    Boolean,
    Float,
    Decimal,
    DateTime,
    /// A filesystem path, as UTF-8 text.
    Path,
    /// Elements encoded with the inner kind, each behind a 2-byte length.
    ListOf(Box<ArgumentKind>),
    /// A sequence of boxes, each decoded with its own sub-schema.
    AmpList(Vec<(String, Argument)>),
    /// A file descriptor sent out-of-band; only its ordinal is inline.
    Descriptor,
}

/// A named slot's codec plus whether the slot may be omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    kind: ArgumentKind,
    optional: bool,
}

impl Argument {
    pub fn new(kind: ArgumentKind) -> Self {
        Self { kind, optional: false }
    }

    pub fn integer() -> Self {
        Self::new(ArgumentKind::Integer)
    }

    pub fn bytes() -> Self {
        Self::new(ArgumentKind::Bytes)
    }

    pub fn text() -> Self {
        Self::new(ArgumentKind::Text)
    }

    pub fn boolean() -> Self {
        Self::new(ArgumentKind::Boolean)
    }

    pub fn float() -> Self {
        Self::new(ArgumentKind::Float)
    }

    pub fn decimal() -> Self {
        Self::new(ArgumentKind::Decimal)
    }

    pub fn date_time() -> Self {
        Self::new(ArgumentKind::DateTime)
    }

    pub fn path() -> Self {
        Self::new(ArgumentKind::Path)
    }

    pub fn descriptor() -> Self {
        Self::new(ArgumentKind::Descriptor)
    }

    /// A list whose elements use `element`'s codec. The element's own
    /// `optional` flag is ignored.
    pub fn list_of(element: Argument) -> Self {
        Self::new(ArgumentKind::ListOf(Box::new(element.kind)))
    }

    /// A list of boxes, each described by `fields`.
    pub fn amp_list<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Argument)>,
        S: Into<String>,
    {
        Self::new(ArgumentKind::AmpList(
            fields.into_iter().map(|(name, arg)| (name.into(), arg)).collect(),
        ))
    }

    /// Mark the slot as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn kind(&self) -> &ArgumentKind {
        &self.kind
    }

    /// Write `values[name]` into `out` under `name`.
    pub fn encode(
        &self,
        name: &str,
        values: &Values,
        out: &mut AmpBox,
        ctx: &mut dyn CodecContext,
    ) -> Result<(), CodecError> {
        let value = match values.get(name) {
            Some(value) => value,
            None if self.optional => return Ok(()),
            None => return Err(CodecError::encode(name, "no value supplied")),
        };
        let encoded = to_wire(&self.kind, name, value, ctx)?;
        if encoded.len() > MAX_VALUE_LENGTH {
            return Err(BoxError::TooLong {
                is_key: false,
                length: encoded.len(),
                key: Some(name.as_bytes().to_vec()),
            }
            .into());
        }
        out.insert(name, encoded);
        Ok(())
    }

    /// Read `name` from `input` into `out`.
    pub fn decode(
        &self,
        name: &str,
        input: &AmpBox,
        out: &mut Values,
        ctx: &mut dyn CodecContext,
    ) -> Result<(), CodecError> {
        match input.get(name.as_bytes()) {
            Some(raw) => {
                out.insert(name, from_wire(&self.kind, name, raw, ctx)?);
            }
            None if self.optional => {
                out.insert(name, Value::Absent);
            }
            None => return Err(CodecError::Missing { name: name.to_string() }),
        }
        Ok(())
    }
}

/// Encode every declared slot of `schema` from `values` into `out`.
pub fn encode_values(
    schema: &[(String, Argument)],
    values: &Values,
    out: &mut AmpBox,
    ctx: &mut dyn CodecContext,
) -> Result<(), CodecError> {
    for (name, argument) in schema {
        argument.encode(name, values, out, ctx)?;
    }
    Ok(())
}

/// Decode every declared slot of `schema` from `input`. Undeclared keys are
/// ignored.
pub fn decode_values(
    schema: &[(String, Argument)],
    input: &AmpBox,
    ctx: &mut dyn CodecContext,
) -> Result<Values, CodecError> {
    let mut out = Values::new();
    for (name, argument) in schema {
        argument.decode(name, input, &mut out, ctx)?;
    }
    Ok(out)
}

fn mismatch(name: &str, expected: &str, value: &Value) -> CodecError {
    CodecError::encode(name, format!("expected {expected}, got {}", value.type_name()))
}

fn to_wire(
    kind: &ArgumentKind,
    name: &str,
    value: &Value,
    ctx: &mut dyn CodecContext,
) -> Result<Vec<u8>, CodecError> {
    match (kind, value) {
        (ArgumentKind::Integer, Value::Integer(n)) => Ok(n.to_string().into_bytes()),
        (ArgumentKind::Bytes, Value::Bytes(b)) => Ok(b.clone()),
        (ArgumentKind::Text, Value::Text(s)) => Ok(s.as_bytes().to_vec()),
        (ArgumentKind::Boolean, Value::Bool(b)) => {
            Ok(if *b { b"True".to_vec() } else { b"False".to_vec() })
        }
        (ArgumentKind::Float, Value::Float(x)) => Ok(format!("{x:?}").into_bytes()),
        (ArgumentKind::Decimal, Value::Decimal(d)) => Ok(d.to_string().into_bytes()),
        (ArgumentKind::DateTime, Value::Timestamp(t)) => {
            format_timestamp(t).map(String::into_bytes).map_err(|r| CodecError::encode(name, r))
        }
        (ArgumentKind::DateTime, Value::NaiveTimestamp(_)) => {
            Err(CodecError::encode(name, "cannot serialize a timestamp without a UTC offset"))
        }
        (ArgumentKind::Path, Value::Path(p)) => match p.to_str() {
            Some(s) => Ok(s.as_bytes().to_vec()),
            None => Err(CodecError::encode(name, "path is not valid UTF-8")),
        },
        (ArgumentKind::ListOf(element), Value::List(items)) => {
            let mut out = Vec::new();
            for item in items {
                let encoded = to_wire(element, name, item, ctx)?;
                let length = u16::try_from(encoded.len()).map_err(|_| {
                    CodecError::encode(name, format!("list element too long: {}", encoded.len()))
                })?;
                out.extend_from_slice(&length.to_be_bytes());
                out.extend_from_slice(&encoded);
            }
            Ok(out)
        }
        (ArgumentKind::AmpList(fields), Value::Boxes(items)) => {
            let mut out = Vec::new();
            for item in items {
                let mut sub = AmpBox::new();
                encode_values(fields, item, &mut sub, ctx)?;
                out.extend(sub.serialize()?);
            }
            Ok(out)
        }
        (ArgumentKind::Descriptor, Value::Descriptor(fd)) => {
            let ordinal =
                ctx.send_descriptor(fd.as_fd()).map_err(|r| CodecError::encode(name, r))?;
            Ok(ordinal.to_string().into_bytes())
        }
        (kind, value) => Err(mismatch(name, kind_name(kind), value)),
    }
}

fn from_wire(
    kind: &ArgumentKind,
    name: &str,
    raw: &[u8],
    ctx: &mut dyn CodecContext,
) -> Result<Value, CodecError> {
    let text = || std::str::from_utf8(raw).map_err(|e| CodecError::decode(name, e.to_string()));
    match kind {
        ArgumentKind::Integer => BigInt::from_str(text()?)
            .map(Value::Integer)
            .map_err(|e| CodecError::decode(name, e.to_string())),
        ArgumentKind::Bytes => Ok(Value::Bytes(raw.to_vec())),
        ArgumentKind::Text => Ok(Value::Text(text()?.to_string())),
        ArgumentKind::Boolean => match raw {
            b"True" => Ok(Value::Bool(true)),
            b"False" => Ok(Value::Bool(false)),
            other => Err(CodecError::decode(
                name,
                format!("bad boolean value: {}", other.escape_ascii()),
            )),
        },
        ArgumentKind::Float => f64::from_str(text()?)
            .map(Value::Float)
            .map_err(|e| CodecError::decode(name, e.to_string())),
        ArgumentKind::Decimal => Decimal::from_str(text()?)
            .map(Value::Decimal)
            .map_err(|e| CodecError::decode(name, e.to_string())),
        ArgumentKind::DateTime => {
            parse_timestamp(text()?).map(Value::Timestamp).map_err(|r| CodecError::decode(name, r))
        }
        ArgumentKind::Path => Ok(Value::Path(PathBuf::from(text()?))),
        ArgumentKind::ListOf(element) => {
            let mut items = Vec::new();
            let mut rest = raw;
            while !rest.is_empty() {
                let (length, tail) = match rest {
                    [hi, lo, tail @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, tail),
                    _ => return Err(CodecError::decode(name, "truncated list length")),
                };
                if tail.len() < length {
                    return Err(CodecError::decode(name, "truncated list element"));
                }
                let (element_bytes, next) = tail.split_at(length);
                items.push(from_wire(element, name, element_bytes, ctx)?);
                rest = next;
            }
            Ok(Value::List(items))
        }
        ArgumentKind::AmpList(fields) => {
            let boxes = parse_boxes(raw).map_err(|e| CodecError::decode(name, e.to_string()))?;
            let mut items = Vec::with_capacity(boxes.len());
            for parsed in &boxes {
                items.push(decode_values(fields, parsed, ctx)?);
            }
            Ok(Value::Boxes(items))
        }
        ArgumentKind::Descriptor => {
            let ordinal =
                u64::from_str(text()?).map_err(|e| CodecError::decode(name, e.to_string()))?;
            let fd = ctx.receive_descriptor(ordinal).map_err(|r| CodecError::decode(name, r))?;
            Ok(Value::from(fd))
        }
    }
}

fn kind_name(kind: &ArgumentKind) -> &'static str {
    match kind {
        ArgumentKind::Integer => "integer",
        ArgumentKind::Bytes => "bytes",
        ArgumentKind::Text => "text",
        ArgumentKind::Boolean => "bool",
        ArgumentKind::Float => "float",
        ArgumentKind::Decimal => "decimal",
        ArgumentKind::DateTime => "timestamp",
        ArgumentKind::Path => "path",
        ArgumentKind::ListOf(_) => "list",
        ArgumentKind::AmpList(_) => "boxes",
        ArgumentKind::Descriptor => "descriptor",
    }
}

/// Render a timestamp in the fixed 32-character wire format.
///
/// The offset sign is `+` only for offsets strictly east of UTC, so UTC
/// itself is written `-00:00`.
pub fn format_timestamp(t: &DateTime<FixedOffset>) -> Result<String, String> {
    let offset_minutes = t.offset().local_minus_utc() / 60;
    let sign = if offset_minutes > 0 { '+' } else { '-' };
    let abs = offset_minutes.abs();
    let rendered = format!(
        "{}{sign}{:02}:{:02}",
        t.format("%Y-%m-%dT%H:%M:%S%.6f"),
        abs / 60,
        abs % 60
    );
    if rendered.len() != TIMESTAMP_LENGTH {
        return Err(format!("timestamp {rendered} does not fit the wire format"));
    }
    Ok(rendered)
}

/// Parse the fixed 32-character wire format back into a timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, String> {
    let invalid = || format!("invalid date format {s:?}");
    if s.len() != TIMESTAMP_LENGTH {
        return Err(invalid());
    }
    let field = |from: usize, to: usize| -> Result<u32, String> {
        s.get(from..to).and_then(|part| part.parse::<u32>().ok()).ok_or_else(invalid)
    };

    let year = i32::try_from(field(0, 4)?).map_err(|_| invalid())?;
    let (month, day) = (field(5, 7)?, field(8, 10)?);
    let (hour, minute, second) = (field(11, 13)?, field(14, 16)?, field(17, 19)?);
    let micro = field(20, 26)?;
    let direction = match s.get(26..27) {
        Some("+") => 1,
        Some("-") => -1,
        _ => return Err(invalid()),
    };
    let offset_seconds = i32::try_from(field(27, 29)? * 3600 + field(30, 32)? * 60)
        .map_err(|_| invalid())?;

    let offset = FixedOffset::east_opt(direction * offset_seconds).ok_or_else(invalid)?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_micro_opt(hour, minute, second, micro))
        .ok_or_else(invalid)?;
    offset.from_local_datetime(&naive).single().ok_or_else(invalid)
}

#[cfg(test)]
#[path = "argument_tests.rs"]
mod tests;
