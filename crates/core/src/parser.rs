// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental box parser.
//!
//! Bytes are fed in arbitrary chunks; complete boxes are pulled out one at a
//! time so the caller can stop between two boxes (for a protocol switch) and
//! claim whatever has not been parsed yet.

use bytes::{Buf, BytesMut};

use crate::amp_box::AmpBox;
use crate::error::FramingError;
use crate::keys::MAX_KEY_LENGTH;

/// Which length-prefixed field the parser expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Between boxes; the next field starts a new box.
    Init,
    /// Inside a box, expecting a key or the terminator.
    Key,
    /// Expecting the value for the pending key.
    Value,
}

crate::simple_display! {
    ParseState {
        Init => "init",
        Key => "key",
        Value => "value",
    }
}

#[derive(Debug)]
pub struct BoxParser {
    buffer: BytesMut,
    state: ParseState,
    current: AmpBox,
    pending_key: Option<Vec<u8>>,
}

impl Default for BoxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            state: ParseState::Init,
            current: AmpBox::new(),
            pending_key: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Append received bytes to the parse buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of received bytes not yet consumed by a complete field.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a box has been started but not finished.
    pub fn has_partial(&self) -> bool {
        self.state != ParseState::Init || !self.buffer.is_empty()
    }

    /// Remove and return every byte not yet consumed by the parser.
    pub fn take_buffered(&mut self) -> BytesMut {
        self.buffer.split()
    }

    /// Pull the next complete box out of the buffer, if one is available.
    ///
    /// A key length above 255 is fatal: the error is returned every time this
    /// is called afterwards, since the stream position is lost.
    pub fn next_box(&mut self) -> Result<Option<AmpBox>, FramingError> {
        loop {
            if self.buffer.len() < 2 {
                return Ok(None);
            }
            let length = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
            if self.state != ParseState::Value && length > MAX_KEY_LENGTH {
                return Err(FramingError::KeyTooLong { length });
            }
            if self.buffer.len() < 2 + length {
                return Ok(None);
            }
            self.buffer.advance(2);
            let field = self.buffer.split_to(length).to_vec();

            match self.state {
                ParseState::Init | ParseState::Key => {
                    if field.is_empty() {
                        self.state = ParseState::Init;
                        return Ok(Some(std::mem::take(&mut self.current)));
                    }
                    self.pending_key = Some(field);
                    self.state = ParseState::Value;
                }
                ParseState::Value => {
                    let key = self.pending_key.take().unwrap_or_default();
                    self.current.insert(key, field);
                    self.state = ParseState::Key;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
