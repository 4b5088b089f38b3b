// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! amp-engine: runs the AMP box protocol over a byte stream.
//!
//! Framing, request/response correlation, responder dispatch, in-place TLS
//! upgrades, protocol switching and descriptor passing.

pub mod builtin;
pub mod descriptor;
mod dispatcher;
pub mod error;
mod framing;
pub mod locator;
pub mod outgoing;
pub mod protocol;
pub mod switch;
pub mod tls;
pub mod transport;

#[cfg(test)]
mod test_fixtures;

pub use builtin::{start_tls, TlsError, START_TLS};
pub use descriptor::{DescriptorStream, MAX_DESCRIPTORS_PER_WRITE};
pub use error::{CallError, ConnectionLost, SendError};
pub use locator::{Handler, LocatedResponder, Locator, LocatorBuilder, RawHandler, Reply, ResponderOutput};
pub use outgoing::Outgoing;
pub use protocol::{Amp, AmpBuilder, AmpHandle, Connection, ConnectionHooks};
pub use switch::{InnerProtocol, InnerProtocolFactory, RawTransport};
pub use tls::{TlsClientOptions, TlsServerOptions, TlsSetupError};
pub use transport::{AmpTransport, BoxedTransport, Rewind};
