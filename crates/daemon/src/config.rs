// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: TOML file, then environment, then CLI flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use amp_engine::TlsServerOptions;
use serde::Deserialize;

use crate::env;
use crate::lifecycle::DaemonError;

/// Certificate chain and key for answering `StartTLS`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsConfig {
    pub fn load(&self) -> Result<TlsServerOptions, DaemonError> {
        Ok(TlsServerOptions::from_pem_files(&self.cert, &self.key)?)
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen_tcp: Option<SocketAddr>,
    /// Unix listeners pass file descriptors.
    pub listen_unix: Option<PathBuf>,
    /// Log to daily-rolling files here instead of stderr.
    pub log_dir: Option<PathBuf>,
    pub idle_timeout_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub tls: Option<TlsConfig>,
}

impl Config {
    /// Resolve configuration: `path` > `AMPD_CONFIG` > defaults, with
    /// environment overrides applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self, DaemonError> {
        let path = path.map(Path::to_path_buf).or_else(env::config_path);
        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.with_env()
    }

    pub fn from_file(path: &Path) -> Result<Self, DaemonError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DaemonError::ConfigRead(path.to_path_buf(), e))?;
        Self::parse(&text).map_err(|e| DaemonError::ConfigParse(path.to_path_buf(), e))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `AMPD_*` overrides. With no listener configured anywhere, fall
    /// back to a Unix socket in the state directory.
    pub fn with_env(mut self) -> Result<Self, DaemonError> {
        if let Some(addr) = env::tcp_addr() {
            self.listen_tcp = Some(addr);
        }
        if let Some(path) = env::unix_path() {
            self.listen_unix = Some(path);
        }
        if let Some(dir) = env::log_dir() {
            self.log_dir = Some(dir);
        }
        if let Some(idle) = env::idle_timeout() {
            self.idle_timeout_ms = Some(millis(idle));
        }
        if let Some(drain) = env::drain_timeout() {
            self.drain_timeout_ms = Some(millis(drain));
        }
        if self.listen_tcp.is_none() && self.listen_unix.is_none() {
            self.listen_unix = Some(env::state_dir()?.join("ampd.sock"));
        }
        Ok(self)
    }

    /// Apply command-line overrides.
    pub fn with_flags(mut self, tcp: Option<SocketAddr>, unix: Option<PathBuf>) -> Self {
        if tcp.is_some() {
            self.listen_tcp = tcp;
        }
        if unix.is_some() {
            self.listen_unix = unix;
        }
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout_ms.map(Duration::from_millis).unwrap_or(env::DEFAULT_DRAIN_TIMEOUT)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
