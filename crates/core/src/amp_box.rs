// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The box: the protocol's atomic key/value message unit.
//!
//! Wire format:
//!
//! ```text
//! Box        := (KeyField ValueField)* EndMarker
//! KeyField   := u16-BE length (1..=255) ++ bytes
//! ValueField := u16-BE length (0..=65535) ++ bytes
//! EndMarker  := u16-BE 0
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{BoxError, FramingError};
use crate::keys::{self, MAX_KEY_LENGTH, MAX_VALUE_LENGTH};
use crate::parser::BoxParser;

/// Which role a box plays in the request/response protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxKind<'a> {
    /// A successful response carrying the original `_ask` tag.
    Answer(&'a [u8]),
    /// An error response carrying the original `_ask` tag.
    Error(&'a [u8]),
    /// A command, with its tag if the caller wants an answer.
    Command { name: &'a [u8], ask: Option<&'a [u8]> },
}

/// An ordered mapping of byte keys to byte values.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AmpBox {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl AmpBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a box from key/value pairs; later pairs replace earlier ones.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self { entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Set `key` to `value`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Copy every entry of `other` into this box, replacing duplicates.
    pub fn extend(&mut self, other: AmpBox) {
        self.entries.extend(other.entries);
    }

    /// Check the key and value limits without producing bytes.
    pub fn check_limits(&self) -> Result<(), BoxError> {
        for (key, value) in &self.entries {
            if key.is_empty() {
                return Err(BoxError::EmptyKey);
            }
            if key.len() > MAX_KEY_LENGTH {
                return Err(BoxError::TooLong { is_key: true, length: key.len(), key: None });
            }
            if value.len() > MAX_VALUE_LENGTH {
                return Err(BoxError::TooLong {
                    is_key: false,
                    length: value.len(),
                    key: Some(key.clone()),
                });
            }
        }
        Ok(())
    }

    /// Render the box in wire format.
    pub fn serialize(&self) -> Result<Vec<u8>, BoxError> {
        self.check_limits()?;
        let size = self.entries.iter().map(|(k, v)| 4 + k.len() + v.len()).sum::<usize>() + 2;
        let mut out = Vec::with_capacity(size);
        for (key, value) in &self.entries {
            for field in [key, value] {
                // Lengths were checked above, so both fit in a u16.
                out.extend_from_slice(&(field.len() as u16).to_be_bytes());
                out.extend_from_slice(field);
            }
        }
        out.extend_from_slice(&0u16.to_be_bytes());
        Ok(out)
    }

    /// Classify the box by its protocol markers.
    ///
    /// Exactly one of `_answer`, `_error` or `_command` must be present, and
    /// `_ask` is only valid next to `_command`.
    pub fn kind(&self) -> Result<BoxKind<'_>, BoxError> {
        let answer = self.get(keys::ANSWER);
        let error = self.get(keys::ERROR);
        let command = self.get(keys::COMMAND);
        let ask = self.get(keys::ASK);

        let markers = [answer, error, command].iter().filter(|m| m.is_some()).count();
        if markers == 0 {
            return Err(BoxError::Unmarked);
        }
        if markers > 1 {
            return Err(BoxError::MalformedBox(format!(
                "expected exactly one of _answer, _error, _command; found {markers}"
            )));
        }
        match (answer, error, command) {
            (Some(tag), _, _) if ask.is_none() => Ok(BoxKind::Answer(tag)),
            (_, Some(tag), _) if ask.is_none() => Ok(BoxKind::Error(tag)),
            (_, _, Some(name)) => Ok(BoxKind::Command { name, ask }),
            _ => Err(BoxError::MalformedBox("_ask without _command".to_string())),
        }
    }

    /// Check the marker invariant for a box about to be sent.
    pub fn validate_markers(&self) -> Result<(), BoxError> {
        self.kind().map(|_| ())
    }
}

impl<K: Into<Vec<u8>>, V: Into<Vec<u8>>> FromIterator<(K, V)> for AmpBox {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl fmt::Debug for AmpBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (escape(k), escape(v)))).finish()
    }
}

impl fmt::Display for AmpBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AmpBox({self:?})")
    }
}

/// Parse a complete byte string into boxes.
///
/// Trailing bytes that do not form a whole box are an error.
pub fn parse_boxes(data: &[u8]) -> Result<Vec<AmpBox>, FramingError> {
    let mut parser = BoxParser::new();
    parser.feed(data);
    let mut boxes = Vec::new();
    while let Some(parsed) = parser.next_box()? {
        boxes.push(parsed);
    }
    if parser.has_partial() {
        return Err(FramingError::Truncated { remaining: parser.buffered_len() });
    }
    Ok(boxes)
}

/// Render bytes for logs: printable ASCII as-is, everything else hex-escaped.
pub fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

#[cfg(test)]
#[path = "amp_box_tests.rs"]
mod tests;
