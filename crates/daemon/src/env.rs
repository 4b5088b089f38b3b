// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::DaemonError;

/// Default shutdown drain timeout.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Config file named by `AMPD_CONFIG`.
pub fn config_path() -> Option<PathBuf> {
    std::env::var("AMPD_CONFIG").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Resolve state directory: AMPD_STATE_DIR > XDG_STATE_HOME/ampd > ~/.local/state/ampd
pub fn state_dir() -> Result<PathBuf, DaemonError> {
    if let Ok(dir) = std::env::var("AMPD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("ampd"));
    }
    let home = dirs::home_dir().ok_or(DaemonError::NoStateDir)?;
    Ok(home.join(".local/state/ampd"))
}

/// TCP address to listen on (`AMPD_TCP`).
pub fn tcp_addr() -> Option<SocketAddr> {
    std::env::var("AMPD_TCP").ok().and_then(|s| s.parse().ok())
}

/// Unix socket path to listen on (`AMPD_UNIX`).
pub fn unix_path() -> Option<PathBuf> {
    std::env::var("AMPD_UNIX").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Directory for daily-rolling log files (`AMPD_LOG_DIR`).
pub fn log_dir() -> Option<PathBuf> {
    std::env::var("AMPD_LOG_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Drop connections idle this long (`AMPD_IDLE_TIMEOUT_MS`).
pub fn idle_timeout() -> Option<Duration> {
    millis("AMPD_IDLE_TIMEOUT_MS")
}

/// Shutdown drain timeout override (`AMPD_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Option<Duration> {
    millis("AMPD_DRAIN_TIMEOUT_MS")
}

/// Log filter directives: AMPD_LOG > RUST_LOG > "info"
pub fn log_filter() -> String {
    std::env::var("AMPD_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string())
}

fn millis(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
