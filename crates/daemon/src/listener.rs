// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept loop: one AMP connection per accepted stream.
//!
//! Unix streams are wrapped for descriptor passing. The loop stops when the
//! shutdown token is cancelled; the endpoint shares that token, so every
//! open connection winds down with it and the listener waits for them.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use amp_engine::{Amp, AmpHandle, AmpTransport, ConnectionHooks, ConnectionLost, DescriptorStream};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Tracks open connections.
#[derive(Debug, Default)]
pub struct ConnectionCount {
    active: AtomicUsize,
}

impl ConnectionCount {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl ConnectionHooks for ConnectionCount {
    fn connection_made(&self, handle: &AmpHandle) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(peer = %handle.peer(), active, "client connected");
    }

    fn connection_lost(&self, reason: &ConnectionLost) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(%reason, active, "client disconnected");
    }
}

/// Listener task for accepting socket connections.
pub struct Listener {
    unix: Option<UnixListener>,
    tcp: Option<TcpListener>,
    amp: Amp,
    shutdown: CancellationToken,
}

async fn accept_unix(listener: Option<&UnixListener>) -> io::Result<UnixStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

async fn accept_tcp(listener: Option<&TcpListener>) -> io::Result<TcpStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

impl Listener {
    pub fn new(
        unix: Option<UnixListener>,
        tcp: Option<TcpListener>,
        amp: Amp,
        shutdown: CancellationToken,
    ) -> Self {
        Self { unix, tcp, amp, shutdown }
    }

    /// Run the accept loop until shutdown, then wait for open connections.
    pub async fn run(self) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = accept_unix(self.unix.as_ref()) => match result {
                    Ok(stream) => self.serve(&mut connections, DescriptorStream::new(stream)),
                    Err(e) => error!("Unix accept error: {}", e),
                },
                result = accept_tcp(self.tcp.as_ref()) => match result {
                    Ok(stream) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("TCP_NODELAY not set: {}", e);
                        }
                        self.serve(&mut connections, stream);
                    }
                    Err(e) => error!("TCP accept error: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "listener stopped, draining connections");
        while connections.join_next().await.is_some() {}
    }

    fn serve<T: AmpTransport>(&self, connections: &mut JoinSet<ConnectionLost>, transport: T) {
        let (_handle, connection) = self.amp.connect(transport);
        connections.spawn(connection.run());
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
