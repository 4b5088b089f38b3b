// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AMP daemon library
//!
//! Serves the demo commands over TCP and Unix sockets.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod logging;
pub mod responders;

pub use config::{Config, TlsConfig};
pub use lifecycle::{startup, Daemon, DaemonError};
pub use listener::{ConnectionCount, Listener};
