// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: bind, serve, drain, clean up.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amp_engine::{Amp, TlsSetupError};
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::listener::{ConnectionCount, Listener};
use crate::responders;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to read config {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("Invalid config {0}: {1}")]
    ConfigParse(PathBuf, #[source] toml::de::Error),

    #[error("Failed to bind TCP listener at {0}: {1}")]
    BindTcp(SocketAddr, #[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindUnix(PathBuf, #[source] std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsSetupError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound daemon, ready to serve.
pub struct Daemon {
    listener: Listener,
    shutdown: CancellationToken,
    connections: Arc<ConnectionCount>,
    socket_path: Option<PathBuf>,
    tcp_addr: Option<SocketAddr>,
    config: Config,
}

/// Bind every configured listener and build the endpoint.
pub async fn startup(config: &Config) -> Result<Daemon, DaemonError> {
    let shutdown = CancellationToken::new();
    let connections = Arc::new(ConnectionCount::default());

    let mut builder = Amp::builder()
        .locator(responders::locator())
        .hooks(Arc::clone(&connections))
        .shutdown(shutdown.clone());
    if let Some(tls) = &config.tls {
        builder = builder.tls_server(tls.load()?);
        info!(cert = %tls.cert.display(), "StartTLS enabled");
    }
    if let Some(idle) = config.idle_timeout() {
        builder = builder.idle_timeout(idle);
    }
    let amp = builder.build();

    let tcp = match config.listen_tcp {
        Some(addr) => {
            let listener =
                TcpListener::bind(addr).await.map_err(|e| DaemonError::BindTcp(addr, e))?;
            Some(listener)
        }
        None => None,
    };
    let tcp_addr = tcp.as_ref().map(TcpListener::local_addr).transpose()?;

    let unix = match &config.listen_unix {
        Some(path) => Some(bind_unix(path)?),
        None => None,
    };

    if let Some(addr) = tcp_addr {
        info!(%addr, "listening on TCP");
    }
    if let Some(path) = &config.listen_unix {
        info!(path = %path.display(), "listening on Unix socket");
    }

    Ok(Daemon {
        listener: Listener::new(unix, tcp, amp, shutdown.clone()),
        shutdown,
        connections,
        socket_path: config.listen_unix.clone(),
        tcp_addr,
        config: config.clone(),
    })
}

fn bind_unix(path: &Path) -> Result<UnixListener, DaemonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // A socket file left by a previous run blocks bind.
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path).map_err(|e| DaemonError::BindUnix(path.to_path_buf(), e))
}

impl Daemon {
    /// Address the TCP listener is bound to.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    pub fn connections(&self) -> Arc<ConnectionCount> {
        Arc::clone(&self.connections)
    }

    /// Serve until `signal` resolves, then drain and clean up.
    pub async fn run_until<F: Future<Output = ()>>(self, signal: F) -> Result<(), DaemonError> {
        let listener = tokio::spawn(self.listener.run());
        signal.await;

        info!("Shutting down daemon...");
        self.shutdown.cancel();
        let drain = self.config.drain_timeout();
        match tokio::time::timeout(drain, listener).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Listener task failed: {}", e),
            Err(_) => warn!(
                open = self.connections.active(),
                "Drain timeout after {:?}, dropping connections", drain
            ),
        }

        if let Some(path) = &self.socket_path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove socket file: {}", e);
                }
            }
        }
        info!("Daemon shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
