// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handing a connection over to another protocol.

use std::sync::Arc;

use amp_engine::{InnerProtocol, InnerProtocolFactory, Locator, RawTransport, Reply, ResponderOutput};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::prelude::*;

fn tunnel() -> Command {
    Command::builder("Tunnel").build()
}

/// Writes everything it receives straight back.
struct Mirror {
    transport: Option<RawTransport>,
}

impl InnerProtocol for Mirror {
    fn connection_made(&mut self, transport: RawTransport) {
        transport.write(&b"ready:"[..]).unwrap();
        self.transport = Some(transport);
    }

    fn data_received(&mut self, data: &[u8]) {
        if let Some(transport) = &self.transport {
            transport.write(data.to_vec()).unwrap();
        }
    }

    fn connection_lost(&mut self, _reason: &ConnectionLost) {}
}

/// Sends a payload on connect and forwards what comes back.
struct Probe {
    payload: &'static [u8],
    seen: UnboundedSender<Vec<u8>>,
    transport: Option<RawTransport>,
}

impl InnerProtocol for Probe {
    fn connection_made(&mut self, transport: RawTransport) {
        transport.write(self.payload).unwrap();
        self.transport = Some(transport);
    }

    fn data_received(&mut self, data: &[u8]) {
        let _ = self.seen.send(data.to_vec());
    }

    fn connection_lost(&mut self, _reason: &ConnectionLost) {}
}

struct ProbeFactory {
    payload: &'static [u8],
    seen: UnboundedSender<Vec<u8>>,
}

impl InnerProtocolFactory for ProbeFactory {
    fn build_protocol(&self, _peer: &str) -> Box<dyn InnerProtocol> {
        Box::new(Probe { payload: self.payload, seen: self.seen.clone(), transport: None })
    }
}

async fn mirror_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let locator = Locator::builder()
        .responder(&tunnel(), |_, _| {
            ResponderOutput::ok(Reply::SwitchTo(Box::new(Mirror { transport: None })))
        })
        .extend(&responders::locator())
        .build();
    let amp = Amp::builder().locator(locator).build();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            amp.spawn(stream);
        }
    });
    addr
}

async fn collect(seen: &mut UnboundedReceiver<Vec<u8>>, len: usize) -> Vec<u8> {
    let mut all = Vec::new();
    while all.len() < len {
        let chunk = tokio::time::timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        all.extend(chunk);
    }
    all
}

#[tokio::test]
async fn switched_connections_lose_no_bytes() {
    let addr = mirror_server().await;
    let client = Amp::client().spawn(TcpStream::connect(addr).await.unwrap());

    let (tx, mut rx) = unbounded_channel();
    let factory = Arc::new(ProbeFactory { payload: b"0123456789", seen: tx });
    client.call_switch(&tunnel(), &Values::new(), factory).await.unwrap();

    let expected = b"ready:0123456789";
    assert_eq!(collect(&mut rx, expected.len()).await, expected);
}

#[tokio::test]
async fn switched_connections_refuse_boxes() {
    let addr = mirror_server().await;
    let client = Amp::client().spawn(TcpStream::connect(addr).await.unwrap());

    let (tx, _rx) = unbounded_channel();
    let factory = Arc::new(ProbeFactory { payload: b"", seen: tx });
    let switching = client.call_switch(&tunnel(), &Values::new(), factory);
    let refused = client.call_remote(&responders::sum(), &sum_args(1, 2)).await;
    assert!(matches!(refused, Err(CallError::Send(SendError::Switched))));

    switching.await.unwrap();
    let still_refused = client.call_remote(&responders::sum(), &sum_args(1, 2)).await;
    assert!(matches!(still_refused, Err(CallError::Send(SendError::Switched))));
}
