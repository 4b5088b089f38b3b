// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection, send and call errors.

use std::error::Error;
use std::sync::Arc;

use amp_core::{escape, BoxError, CodecError, RequestError, SignatureError};
use thiserror::Error;

/// Why a connection stopped carrying boxes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionLost {
    /// The peer or a close-after-send box ended the connection cleanly.
    #[error("connection closed")]
    Closed,

    #[error("connection lost: {0}")]
    Io(String),

    /// The peer sent a key length above 255.
    #[error("remote key too long")]
    KeyTooLong,

    /// The peer hung up right after TLS started without sending anything.
    #[error("peer rejected our certificate for an unknown reason")]
    PeerVerify,

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    /// A protocol violation or unhandled failure dropped the connection.
    #[error("connection dropped: {0}")]
    Fatal(String),

    /// Closed locally by shutdown or idle timeout.
    #[error("connection shut down")]
    Shutdown,
}

/// A box could not be queued for sending.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("this connection has switched: no AMP traffic allowed")]
    Switched,

    #[error(transparent)]
    ConnectionLost(ConnectionLost),

    #[error("TLS has already been started on this connection")]
    OnlyOneTls,

    #[error(transparent)]
    Box(#[from] BoxError),
}

/// A remote call did not produce a response.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Encode(CodecError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// The peer answered with an error box.
    ///
    /// `error` is the rebuilt declared type, [`amp_core::UnhandledCommand`],
    /// or [`amp_core::UnknownRemoteError`].
    #[error("remote error {}: {error}", escape(.code))]
    Remote { code: Vec<u8>, error: Arc<dyn Error + Send + Sync> },

    #[error(transparent)]
    ConnectionLost(ConnectionLost),

    /// The answer box did not match the response schema.
    #[error("bad response: {0}")]
    Decode(CodecError),
}

impl CallError {
    /// The wire error code, for remote errors.
    pub fn code(&self) -> Option<&[u8]> {
        match self {
            Self::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The remote error as its concrete type, if it is one.
    pub fn remote<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Remote { error, .. } => error.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<RequestError> for CallError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Signature(e) => Self::Signature(e),
            RequestError::Codec(e) => Self::Encode(e),
        }
    }
}

impl From<ConnectionLost> for CallError {
    fn from(reason: ConnectionLost) -> Self {
        Self::ConnectionLost(reason)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
