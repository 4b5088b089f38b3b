// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors that cross the wire as `_error_code` / `_error_description`.

use std::error::Error;

use thiserror::Error;

use crate::amp_box::escape;

/// An error type a command may declare under a wire code.
///
/// Responders fail with the type; callers receive a fresh value rebuilt from
/// the description text sent by the peer.
pub trait RemoteErrorType: Error + Send + Sync + 'static {
    fn from_description(description: String) -> Self
    where
        Self: Sized;
}

/// An error code the caller's command schema does not declare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("code<{}>: {description}", escape(.code))]
pub struct UnknownRemoteError {
    pub code: Vec<u8>,
    pub description: String,
}

/// The peer had no responder for the command that was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description}")]
pub struct UnhandledCommand {
    pub description: String,
}

impl RemoteErrorType for UnhandledCommand {
    fn from_description(description: String) -> Self {
        Self { description }
    }
}

/// An explicit wire error raised by a responder.
///
/// Responders may return this directly to choose the code themselves; it is
/// sent as-is whether or not the command declares the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("code<{}>: {description}", escape(.code))]
pub struct RemoteError {
    pub code: Vec<u8>,
    pub description: String,
    /// Close the connection once the error box has been written.
    pub fatal: bool,
}

impl RemoteError {
    pub fn new(code: impl Into<Vec<u8>>, description: impl Into<String>) -> Self {
        Self { code: code.into(), description: description.into(), fatal: false }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}
