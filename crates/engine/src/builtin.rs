// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands every endpoint understands.

use amp_core::Command;

use crate::locator::{Locator, Reply, ResponderOutput};
use crate::tls::TlsServerOptions;

/// Wire name of the TLS upgrade command.
pub const START_TLS: &str = "StartTLS";

amp_core::remote_error! {
    /// The peer could not start TLS.
    pub struct TlsError;
}

/// `StartTLS`: no arguments, empty response, may fail with `TLS_ERROR`.
pub fn start_tls() -> Command {
    Command::builder(START_TLS).error::<TlsError>("TLS_ERROR").build()
}

/// Responders installed under every endpoint's own locator.
pub(crate) fn defaults(tls: Option<TlsServerOptions>) -> Locator {
    Locator::builder()
        .responder(&start_tls(), move |_args, handle| match &tls {
            None => ResponderOutput::err(TlsError("TLS not available".to_string())),
            Some(_) if handle.is_tls_active() => {
                ResponderOutput::err(TlsError("TLS already active".to_string()))
            }
            Some(options) => ResponderOutput::ok(Reply::StartTls(options.clone())),
        })
        .build()
}
