// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the end-to-end specs.

use std::net::SocketAddr;
use std::time::Duration;

pub use amp_core::{AmpBox, Argument, BoxParser, Command, Values};
pub use amp_daemon::{responders, startup, Config, TlsConfig};
pub use amp_engine::{Amp, AmpHandle, CallError, ConnectionLost, SendError, TlsClientOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
pub use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// An `ampd` running in-process on an ephemeral TCP port.
pub struct TestDaemon {
    pub addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TestDaemon {
    pub async fn start() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        config.listen_tcp = Some("127.0.0.1:0".parse().unwrap());
        let daemon = startup(&config).await.unwrap();
        let addr = daemon.tcp_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            daemon
                .run_until(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });
        Self { addr, stop, task }
    }

    pub async fn client(&self) -> AmpHandle {
        Amp::client().spawn(TcpStream::connect(self.addr).await.unwrap())
    }

    pub async fn raw(&self) -> RawClient {
        RawClient::connect(self.addr).await
    }

    pub async fn stop(self) {
        let _ = self.stop.send(());
        tokio::time::timeout(TIMEOUT, self.task).await.unwrap().unwrap();
    }
}

/// Speaks the wire format by hand.
pub struct RawClient {
    stream: TcpStream,
    parser: BoxParser,
}

impl RawClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::from_stream(TcpStream::connect(addr).await.unwrap())
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream, parser: BoxParser::new() }
    }

    pub async fn send<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let bytes = AmpBox::from_pairs(pairs).serialize().unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// The next box, or `None` once the daemon hangs up.
    pub async fn recv(&mut self) -> Option<AmpBox> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(ampbox) = self.parser.next_box().unwrap() {
                return Some(ampbox);
            }
            let read = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
                .await
                .unwrap()
                .unwrap_or(0);
            if read == 0 {
                return None;
            }
            self.parser.feed(&buf[..read]);
        }
    }
}

pub fn sum_args(a: i64, b: i64) -> Values {
    Values::new().with("a", a).with("b", b)
}
