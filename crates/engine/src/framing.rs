// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection framing engine.
//!
//! One driver task owns the transport: it is the only reader and the only
//! writer. Everything else talks to it through [`Shared`], whose mutex
//! guards the send path, and an unbounded channel of [`Frame`]s, so queuing
//! a box never blocks and boxes hit the wire in the order they were queued.
//!
//! Start-TLS and protocol switches take effect between two boxes: the driver
//! handles the triggering answer before it parses any further bytes.

use std::collections::{HashMap, VecDeque};
use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::Duration;

use amp_core::{BoxParser, CodecContext};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::descriptor::MAX_DESCRIPTORS_PER_WRITE;
use crate::dispatcher::{Dispatcher, Pending, Transition};
use crate::error::{ConnectionLost, SendError};
use crate::outgoing::Outgoing;
use crate::protocol::ConnectionHooks;
use crate::switch::{InnerProtocol, InnerProtocolFactory, RawTransport};
use crate::tls::{peer_certificates, TlsClientOptions, TlsServerOptions, UpgradedTransport};
use crate::transport::{BoxedTransport, Detached, Rewind};

/// Bytes reserved for each read.
const READ_CHUNK: usize = 16 * 1024;

/// How long a closing connection may take to flush.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Unit of work for the driver's write side.
pub(crate) enum Frame {
    Box { bytes: Vec<u8>, fds: Vec<OwnedFd>, after: AfterSend },
    /// Bytes from a switched-in protocol.
    Raw(Bytes),
    Close,
}

/// What the driver does once a box has been written.
pub(crate) enum AfterSend {
    Nothing,
    Close,
    Switch(Box<dyn InnerProtocol>),
    Tls(TlsServerOptions),
}

pub(crate) enum TlsPhase {
    Plain,
    /// A handshake is about to start; boxes wait here instead of going out
    /// in plaintext.
    Preparing(Vec<Frame>),
    Active,
}

/// Connection state shared by the driver and every handle.
pub(crate) struct ConnState {
    /// No more boxes may be sent (a switch is pending or done).
    pub locked: bool,
    pub lost: Option<ConnectionLost>,
    pub tls: TlsPhase,
    pub outstanding: HashMap<Vec<u8>, Pending>,
    pub peer_certificates: Option<Vec<CertificateDer<'static>>>,
    last_tag: u64,
    descriptors: bool,
    next_send_ordinal: u64,
    next_receive_ordinal: u64,
    received: HashMap<u64, OwnedFd>,
}

impl ConnState {
    pub fn check_sendable(&self) -> Result<(), SendError> {
        if self.locked {
            return Err(SendError::Switched);
        }
        match &self.lost {
            Some(reason) => Err(SendError::ConnectionLost(reason.clone())),
            None => Ok(()),
        }
    }

    /// Next correlation tag: lowercase hex of a counter starting at 1.
    pub fn next_tag(&mut self) -> Vec<u8> {
        self.last_tag += 1;
        format!("{:x}", self.last_tag).into_bytes()
    }
}

pub(crate) struct Shared {
    pub state: Mutex<ConnState>,
    pub peer: String,
    pub host: String,
    frames: mpsc::UnboundedSender<Frame>,
    lost: watch::Sender<Option<ConnectionLost>>,
}

impl Shared {
    pub fn new(
        frames: mpsc::UnboundedSender<Frame>,
        descriptors: bool,
        peer: String,
        host: String,
    ) -> Self {
        let state = ConnState {
            locked: false,
            lost: None,
            tls: TlsPhase::Plain,
            outstanding: HashMap::new(),
            peer_certificates: None,
            last_tag: 0,
            descriptors,
            next_send_ordinal: 0,
            next_receive_ordinal: 0,
            received: HashMap::new(),
        };
        let (lost, _) = watch::channel(None);
        Self { state: Mutex::new(state), peer, host, frames, lost }
    }

    pub fn raw_transport(&self) -> RawTransport {
        RawTransport::new(self.frames.clone())
    }

    pub fn subscribe_lost(&self) -> watch::Receiver<Option<ConnectionLost>> {
        self.lost.subscribe()
    }

    /// Ask the driver to close, bypassing any TLS queue.
    pub fn close(&self) {
        let _ = self.frames.send(Frame::Close);
    }

    /// Hand a frame to the driver, or hold it while TLS is being prepared.
    pub fn enqueue(&self, state: &mut ConnState, frame: Frame) {
        match &mut state.tls {
            TlsPhase::Preparing(queued) => queued.push(frame),
            TlsPhase::Plain | TlsPhase::Active => {
                // A closed channel means the driver is gone; `lost` reports it.
                let _ = self.frames.send(frame);
            }
        }
    }

    pub fn send_box(&self, outgoing: Outgoing) -> Result<(), SendError> {
        let mut state = self.state.lock();
        self.push_box(&mut state, outgoing, Vec::new())
    }

    /// Queue a box whose descriptors (if any) were already collected.
    pub fn push_box(
        &self,
        state: &mut ConnState,
        outgoing: Outgoing,
        fds: Vec<OwnedFd>,
    ) -> Result<(), SendError> {
        state.check_sendable()?;
        outgoing.ampbox().validate_markers()?;
        let (ampbox, after) = match outgoing {
            Outgoing::Plain(b) => (b, AfterSend::Nothing),
            Outgoing::CloseAfterSend(b) => (b, AfterSend::Close),
            Outgoing::SwitchTo(b, inner) => (b, AfterSend::Switch(inner)),
            Outgoing::UpgradeTls(b, options) => {
                if !matches!(state.tls, TlsPhase::Plain) {
                    return Err(SendError::OnlyOneTls);
                }
                (b, AfterSend::Tls(options))
            }
        };
        let bytes = ampbox.serialize()?;
        debug!(peer = %self.peer, %ampbox, "sending box");

        let locks = matches!(after, AfterSend::Switch(_));
        let starts_tls = matches!(after, AfterSend::Tls(_));
        self.enqueue(state, Frame::Box { bytes, fds, after });
        if locks {
            state.locked = true;
        }
        if starts_tls {
            state.tls = TlsPhase::Preparing(Vec::new());
        }
        Ok(())
    }

    /// Record the terminal failure and fail everything still waiting.
    pub fn connection_lost(&self, reason: &ConnectionLost) {
        let pending: Vec<Pending> = {
            let mut state = self.state.lock();
            state.lost = Some(reason.clone());
            // Boxes held for a handshake that never completed are discarded.
            state.tls = TlsPhase::Plain;
            state.received.clear();
            state.outstanding.drain().map(|(_, pending)| pending).collect()
        };
        for waiting in pending {
            waiting.fail(reason.clone().into(), &self.peer);
        }
        self.lost.send_replace(Some(reason.clone()));
    }
}

/// Codec context used while encoding an outgoing box.
///
/// Descriptor ordinals are assigned under the state lock, in the order the
/// boxes are queued. A failed encode hands its ordinals back.
pub(crate) struct SendContext<'a> {
    state: &'a mut ConnState,
    first_ordinal: u64,
    fds: Vec<OwnedFd>,
}

impl<'a> SendContext<'a> {
    pub fn new(state: &'a mut ConnState) -> Self {
        let first_ordinal = state.next_send_ordinal;
        Self { state, first_ordinal, fds: Vec::new() }
    }

    pub fn finish(self) -> Vec<OwnedFd> {
        self.fds
    }

    pub fn rollback(self) {
        self.state.next_send_ordinal = self.first_ordinal;
    }
}

impl CodecContext for SendContext<'_> {
    fn send_descriptor(&mut self, fd: BorrowedFd<'_>) -> Result<u64, String> {
        if !self.state.descriptors {
            return Err("descriptor passing is not available on this connection".to_string());
        }
        if self.fds.len() >= MAX_DESCRIPTORS_PER_WRITE {
            return Err(format!("at most {MAX_DESCRIPTORS_PER_WRITE} descriptors per box"));
        }
        self.fds.push(fd.try_clone_to_owned().map_err(|e| e.to_string())?);
        let ordinal = self.state.next_send_ordinal;
        self.state.next_send_ordinal += 1;
        Ok(ordinal)
    }

    fn receive_descriptor(&mut self, _ordinal: u64) -> Result<OwnedFd, String> {
        Err("cannot claim descriptors while encoding".to_string())
    }
}

/// Codec context used while decoding an incoming box.
pub(crate) struct ReceiveContext<'a> {
    state: &'a mut ConnState,
}

impl<'a> ReceiveContext<'a> {
    pub fn new(state: &'a mut ConnState) -> Self {
        Self { state }
    }
}

impl CodecContext for ReceiveContext<'_> {
    fn send_descriptor(&mut self, _fd: BorrowedFd<'_>) -> Result<u64, String> {
        Err("cannot send descriptors while decoding".to_string())
    }

    fn receive_descriptor(&mut self, ordinal: u64) -> Result<OwnedFd, String> {
        self.state
            .received
            .remove(&ordinal)
            .ok_or_else(|| format!("no descriptor received with ordinal {ordinal}"))
    }
}

struct Switched {
    protocol: Box<dyn InnerProtocol>,
    factory: Option<Arc<dyn InnerProtocolFactory>>,
}

pub(crate) struct DriverOptions {
    pub idle_timeout: Option<Duration>,
    pub shutdown: CancellationToken,
    pub hooks: Option<Arc<dyn ConnectionHooks>>,
}

/// The connection's event loop.
pub(crate) struct Driver {
    io: BoxedTransport,
    shared: Arc<Shared>,
    frames: mpsc::UnboundedReceiver<Frame>,
    dispatcher: Dispatcher,
    parser: BoxParser,
    read_buf: BytesMut,
    /// Frames released by a finished handshake, written before new ones.
    backlog: VecDeque<Frame>,
    inner: Option<Switched>,
    just_started_tls: bool,
    options: DriverOptions,
}

fn io_lost(e: std::io::Error) -> ConnectionLost {
    ConnectionLost::Io(e.to_string())
}

impl Driver {
    pub fn new(
        io: BoxedTransport,
        shared: Arc<Shared>,
        frames: mpsc::UnboundedReceiver<Frame>,
        dispatcher: Dispatcher,
        options: DriverOptions,
    ) -> Self {
        Self {
            io,
            shared,
            frames,
            dispatcher,
            parser: BoxParser::new(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            backlog: VecDeque::new(),
            inner: None,
            just_started_tls: false,
            options,
        }
    }

    /// Run until the connection ends; returns why it ended.
    pub async fn run(mut self) -> ConnectionLost {
        let reason = self.event_loop().await;
        self.finish(reason).await
    }

    async fn event_loop(&mut self) -> ConnectionLost {
        loop {
            if let Some(frame) = self.backlog.pop_front() {
                if let Err(reason) = self.write_frame(frame).await {
                    return reason;
                }
                continue;
            }

            self.read_buf.reserve(READ_CHUNK);
            let idle_timeout = self.options.idle_timeout;
            let idle = async move {
                match idle_timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };

            let step = tokio::select! {
                frame = self.frames.recv() => match frame {
                    Some(frame) => self.write_frame(frame).await,
                    None => Err(ConnectionLost::Shutdown),
                },
                read = self.io.read_buf(&mut self.read_buf) => match read {
                    Ok(0) => Err(ConnectionLost::Closed),
                    Ok(_) => self.on_read().await,
                    Err(e) => Err(io_lost(e)),
                },
                _ = idle => {
                    warn!(peer = %self.shared.peer, "idle timeout");
                    Err(ConnectionLost::Shutdown)
                }
                _ = self.options.shutdown.cancelled() => Err(ConnectionLost::Shutdown),
            };
            if let Err(reason) = step {
                return reason;
            }
        }
    }

    async fn on_read(&mut self) -> Result<(), ConnectionLost> {
        let data = self.read_buf.split();
        self.just_started_tls = false;
        if let Some(switched) = self.inner.as_mut() {
            switched.protocol.data_received(&data);
            return Ok(());
        }
        self.collect_descriptors();
        self.parser.feed(&data);
        self.drain_parser().await
    }

    fn collect_descriptors(&mut self) {
        let fds = self.io.take_received_descriptors();
        if fds.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock();
        for fd in fds {
            let ordinal = state.next_receive_ordinal;
            state.next_receive_ordinal += 1;
            state.received.insert(ordinal, fd);
        }
    }

    async fn drain_parser(&mut self) -> Result<(), ConnectionLost> {
        while self.inner.is_none() {
            let incoming = match self.parser.next_box() {
                Ok(Some(incoming)) => incoming,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(peer = %self.shared.peer, error = %e, "dropping connection");
                    return Err(ConnectionLost::KeyTooLong);
                }
            };
            debug!(peer = %self.shared.peer, ampbox = %incoming, "box received");
            if let Some(transition) = self.dispatcher.receive(incoming)? {
                self.transition(transition).await?;
            }
        }
        Ok(())
    }

    async fn transition(&mut self, transition: Transition) -> Result<(), ConnectionLost> {
        match transition {
            Transition::ClientTls { options, resolution } => match self.connect_tls(&options).await {
                Ok(()) => {
                    resolution.deliver(&self.shared.peer);
                    Ok(())
                }
                Err(reason) => {
                    resolution.fail(reason.clone().into(), &self.shared.peer);
                    Err(reason)
                }
            },
            Transition::Switch { factory, resolution } => {
                let protocol = factory.build_protocol(&self.shared.peer);
                self.switch_to(protocol, Some(factory));
                resolution.deliver(&self.shared.peer);
                Ok(())
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionLost> {
        match frame {
            Frame::Box { bytes, fds, after } => {
                if !fds.is_empty() {
                    self.io.queue_descriptors(fds).map_err(io_lost)?;
                }
                self.write(&bytes).await?;
                match after {
                    AfterSend::Nothing => Ok(()),
                    AfterSend::Close => Err(ConnectionLost::Closed),
                    AfterSend::Switch(protocol) => {
                        self.switch_to(protocol, None);
                        Ok(())
                    }
                    AfterSend::Tls(options) => self.accept_tls(&options).await,
                }
            }
            Frame::Raw(bytes) => self.write(&bytes).await,
            Frame::Close => Err(ConnectionLost::Closed),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionLost> {
        self.io.write_all(bytes).await.map_err(io_lost)?;
        self.io.flush().await.map_err(io_lost)
    }

    fn switch_to(
        &mut self,
        mut protocol: Box<dyn InnerProtocol>,
        factory: Option<Arc<dyn InnerProtocolFactory>>,
    ) {
        self.shared.state.lock().locked = true;
        let leftover = self.parser.take_buffered();
        info!(peer = %self.shared.peer, buffered = leftover.len(), "switched protocol");
        protocol.connection_made(self.shared.raw_transport());
        if !leftover.is_empty() {
            protocol.data_received(&leftover);
        }
        self.inner = Some(Switched { protocol, factory });
    }

    /// Detach the transport for an upgrade, replaying unparsed bytes.
    fn take_io_for_upgrade(&mut self) -> Rewind<BoxedTransport> {
        let prefix = self.parser.take_buffered().freeze();
        let io = std::mem::replace(&mut self.io, Box::new(Detached));
        Rewind::new(io, prefix)
    }

    async fn connect_tls(&mut self, options: &TlsClientOptions) -> Result<(), ConnectionLost> {
        let io = self.take_io_for_upgrade();
        let stream = options
            .connector()
            .connect(options.server_name(), io)
            .await
            .map_err(|e| ConnectionLost::Tls(e.to_string()))?;
        self.install_tls(tokio_rustls::TlsStream::Client(stream));
        Ok(())
    }

    async fn accept_tls(&mut self, options: &TlsServerOptions) -> Result<(), ConnectionLost> {
        let io = self.take_io_for_upgrade();
        let stream = options
            .acceptor()
            .accept(io)
            .await
            .map_err(|e| ConnectionLost::Tls(e.to_string()))?;
        self.install_tls(tokio_rustls::TlsStream::Server(stream));
        Ok(())
    }

    fn install_tls(&mut self, stream: UpgradedTransport) {
        let queued = {
            let mut state = self.shared.state.lock();
            state.peer_certificates = peer_certificates(&stream);
            state.descriptors = false;
            match std::mem::replace(&mut state.tls, TlsPhase::Active) {
                TlsPhase::Preparing(queued) => queued,
                TlsPhase::Plain | TlsPhase::Active => Vec::new(),
            }
        };
        self.io = Box::new(stream);
        self.just_started_tls = true;
        self.backlog.extend(queued);
        info!(peer = %self.shared.peer, "TLS started");
    }

    async fn finish(mut self, reason: ConnectionLost) -> ConnectionLost {
        let reason = match reason {
            ConnectionLost::Closed | ConnectionLost::Io(_) if self.just_started_tls => {
                ConnectionLost::PeerVerify
            }
            other => other,
        };

        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.io.shutdown()).await;
        if let Some(mut switched) = self.inner.take() {
            switched.protocol.connection_lost(&reason);
            if let Some(factory) = &switched.factory {
                factory.client_connection_lost(&reason);
            }
        }
        self.frames.close();
        info!(peer = %self.shared.peer, host = %self.shared.host, %reason, "connection lost");
        if let Some(hooks) = &self.options.hooks {
            hooks.connection_lost(&reason);
        }
        self.shared.connection_lost(&reason);
        reason
    }
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
