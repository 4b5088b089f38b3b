// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local error taxonomy: framing, box encoding, codecs and signatures.
//!
//! These errors never travel over the wire. Remote failures are described
//! by [`crate::remote`].

use thiserror::Error;

use crate::amp_box::escape;

/// Errors raised while turning a byte stream into boxes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// A key length prefix above 255 arrived; the stream cannot be trusted.
    #[error("remote key too long: {length} bytes")]
    KeyTooLong { length: usize },

    /// Input ended in the middle of a box.
    #[error("truncated box: {remaining} unparsed bytes")]
    Truncated { remaining: usize },
}

/// Errors raised while building or serializing a box locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoxError {
    /// A key or value exceeded its wire limit.
    #[error("local {} too long: {length}", describe_slot(*.is_key, .key.as_deref()))]
    TooLong { is_key: bool, length: usize, key: Option<Vec<u8>> },

    /// Zero-length keys are reserved as the box terminator.
    #[error("empty keys are not allowed")]
    EmptyKey,

    /// None of `_answer`, `_error` or `_command` is present.
    #[error("box has no _answer, _error or _command")]
    Unmarked,

    /// The box carries conflicting markers.
    #[error("malformed box: {0}")]
    MalformedBox(String),
}

fn describe_slot(is_key: bool, key: Option<&[u8]>) -> String {
    match (is_key, key) {
        (true, _) => "key".to_string(),
        (false, Some(key)) => format!("value {}", escape(key)),
        (false, None) => "value".to_string(),
    }
}

/// Errors raised by argument codecs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A native value could not be rendered by its codec.
    #[error("cannot encode {name}: {reason}")]
    Encode { name: String, reason: String },

    /// Wire bytes could not be parsed by their codec.
    #[error("cannot decode {name}: {reason}")]
    Decode { name: String, reason: String },

    /// A required slot is absent from an incoming box.
    #[error("missing required field {name}")]
    Missing { name: String },

    /// The encoded value overflowed the box limits.
    #[error(transparent)]
    Box(#[from] BoxError),
}

impl CodecError {
    pub fn encode(name: &str, reason: impl Into<String>) -> Self {
        Self::Encode { name: name.to_string(), reason: reason.into() }
    }

    pub fn decode(name: &str, reason: impl Into<String>) -> Self {
        Self::Decode { name: name.to_string(), reason: reason.into() }
    }

    /// Name of the offending field, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Encode { name, .. } | Self::Decode { name, .. } | Self::Missing { name } => {
                Some(name)
            }
            Self::Box(_) => None,
        }
    }
}

/// A request was built with the wrong set of arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("forgot {} for {command}", .missing.join(", "))]
    Missing { command: String, missing: Vec<String> },

    #[error("{argument} is not a valid argument")]
    Unknown { command: String, argument: String },
}

/// Everything that can go wrong turning native arguments into a request box.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
