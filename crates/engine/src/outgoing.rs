// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boxes that change the connection once they are written.

use amp_core::AmpBox;

use crate::switch::InnerProtocol;
use crate::tls::TlsServerOptions;

/// A box to send, tagged with what happens after its bytes hit the wire.
pub enum Outgoing {
    Plain(AmpBox),
    /// Close the connection after writing.
    CloseAfterSend(AmpBox),
    /// Hand the connection to `inner` after writing.
    SwitchTo(AmpBox, Box<dyn InnerProtocol>),
    /// Start the server side of a TLS handshake after writing.
    UpgradeTls(AmpBox, TlsServerOptions),
}

impl Outgoing {
    pub fn ampbox(&self) -> &AmpBox {
        match self {
            Self::Plain(b) | Self::CloseAfterSend(b) | Self::SwitchTo(b, _) | Self::UpgradeTls(b, _) => b,
        }
    }
}

impl From<AmpBox> for Outgoing {
    fn from(b: AmpBox) -> Self {
        Self::Plain(b)
    }
}
