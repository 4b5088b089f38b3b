// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handing a connection over to a different protocol mid-stream.
//!
//! After a switch the connection stops parsing boxes. Every byte not yet
//! parsed, and every byte read afterwards, goes verbatim to the inner
//! protocol, which writes through a [`RawTransport`].

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{CallError, ConnectionLost, SendError};
use crate::framing::Frame;

/// A protocol that takes over a connection after a switch.
pub trait InnerProtocol: Send + 'static {
    fn connection_made(&mut self, transport: RawTransport);

    fn data_received(&mut self, data: &[u8]);

    fn connection_lost(&mut self, reason: &ConnectionLost);
}

/// Builds the inner protocol on the side that asked for the switch.
pub trait InnerProtocolFactory: Send + Sync + 'static {
    fn build_protocol(&self, peer: &str) -> Box<dyn InnerProtocol>;

    /// The peer refused the switch, or the connection died first.
    fn client_connection_failed(&self, _reason: &CallError) {}

    /// A switched connection ended.
    fn client_connection_lost(&self, _reason: &ConnectionLost) {}
}

/// Write side of a switched connection.
#[derive(Clone)]
pub struct RawTransport {
    frames: mpsc::UnboundedSender<Frame>,
}

impl RawTransport {
    pub(crate) fn new(frames: mpsc::UnboundedSender<Frame>) -> Self {
        Self { frames }
    }

    pub fn write(&self, data: impl Into<Bytes>) -> Result<(), SendError> {
        self.frames
            .send(Frame::Raw(data.into()))
            .map_err(|_| SendError::ConnectionLost(ConnectionLost::Closed))
    }

    /// Close the connection once pending writes are flushed.
    pub fn close(&self) {
        let _ = self.frames.send(Frame::Close);
    }
}
