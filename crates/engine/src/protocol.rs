// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoints and connection handles.
//!
//! An [`Amp`] endpoint holds what every connection shares: the responder
//! table, TLS credentials and lifecycle hooks. Attaching it to a transport
//! yields an [`AmpHandle`] for making calls and a [`Connection`] that runs
//! the framing loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use amp_core::{AmpBox, Command, Values};
use rustls::pki_types::CertificateDer;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::builtin;
use crate::dispatcher::{Dispatcher, PendingKind, Request, Waiter};
use crate::error::{CallError, ConnectionLost, SendError};
use crate::framing::{Driver, DriverOptions, Shared, TlsPhase};
use crate::locator::Locator;
use crate::outgoing::Outgoing;
use crate::switch::InnerProtocolFactory;
use crate::tls::{TlsClientOptions, TlsServerOptions};
use crate::transport::{AmpTransport, BoxedTransport};

/// Callbacks for connection lifecycle events.
pub trait ConnectionHooks: Send + Sync + 'static {
    /// Runs before the connection reads its first byte.
    fn connection_made(&self, _handle: &AmpHandle) {}

    fn connection_lost(&self, _reason: &ConnectionLost) {}
}

impl<T: ConnectionHooks> ConnectionHooks for Arc<T> {
    fn connection_made(&self, handle: &AmpHandle) {
        (**self).connection_made(handle);
    }

    fn connection_lost(&self, reason: &ConnectionLost) {
        (**self).connection_lost(reason);
    }
}

/// Shared configuration for every connection of one endpoint.
#[derive(Clone)]
pub struct Amp {
    locator: Locator,
    hooks: Option<Arc<dyn ConnectionHooks>>,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl Amp {
    pub fn builder() -> AmpBuilder {
        AmpBuilder::default()
    }

    /// An endpoint with no responders beyond the built-in ones.
    pub fn client() -> Self {
        Self::builder().build()
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Attach to `transport`. Nothing is read until [`Connection::run`].
    pub fn connect<T: AmpTransport>(&self, transport: T) -> (AmpHandle, Connection) {
        let io: BoxedTransport = Box::new(transport);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(
            frames_tx,
            io.supports_descriptors(),
            io.peer_label(),
            io.host_label(),
        ));
        let handle = AmpHandle { shared: Arc::clone(&shared) };
        let dispatcher = Dispatcher::new(handle.clone(), self.locator.clone());
        let options = DriverOptions {
            idle_timeout: self.idle_timeout,
            shutdown: self.shutdown.child_token(),
            hooks: self.hooks.clone(),
        };
        let driver = Driver::new(io, shared, frames_rx, dispatcher, options);

        info!(peer = %handle.peer(), host = %handle.host(), "connection made");
        if let Some(hooks) = &self.hooks {
            hooks.connection_made(&handle);
        }
        (handle, Connection { driver })
    }

    /// Attach to `transport` and run the connection on its own task.
    pub fn spawn<T: AmpTransport>(&self, transport: T) -> AmpHandle {
        let (handle, connection) = self.connect(transport);
        tokio::spawn(connection.run());
        handle
    }
}

#[derive(Default)]
pub struct AmpBuilder {
    locator: Locator,
    hooks: Option<Arc<dyn ConnectionHooks>>,
    tls: Option<TlsServerOptions>,
    idle_timeout: Option<Duration>,
    shutdown: Option<CancellationToken>,
}

impl AmpBuilder {
    pub fn locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    pub fn hooks(mut self, hooks: impl ConnectionHooks) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Credentials for answering `StartTLS`. Without them the built-in
    /// responder refuses with `TLS_ERROR`.
    pub fn tls_server(mut self, options: TlsServerOptions) -> Self {
        self.tls = Some(options);
        self
    }

    /// Drop connections that neither read nor write for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Cancelling `token` closes every connection of the endpoint.
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build(self) -> Amp {
        let locator =
            Locator::builder().extend(&self.locator).extend(&builtin::defaults(self.tls)).build();
        Amp {
            locator,
            hooks: self.hooks,
            idle_timeout: self.idle_timeout,
            shutdown: self.shutdown.unwrap_or_default(),
        }
    }
}

/// The framing loop of one connection.
#[must_use = "a connection does nothing until it is run"]
pub struct Connection {
    driver: Driver,
}

impl Connection {
    /// Run until the connection ends, and report why.
    pub async fn run(self) -> ConnectionLost {
        self.driver.run().await
    }
}

/// Cheap, cloneable handle to a live connection.
#[derive(Clone)]
pub struct AmpHandle {
    shared: Arc<Shared>,
}

fn dropped() -> CallError {
    CallError::ConnectionLost(ConnectionLost::Shutdown)
}

impl AmpHandle {
    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Call `command` on the peer.
    ///
    /// The box is queued before this returns, so calls made in sequence go
    /// out in sequence. A command that does not require an answer resolves
    /// to empty values as soon as it is queued.
    pub fn call_remote(
        &self,
        command: &Command,
        args: &Values,
    ) -> impl Future<Output = Result<Values, CallError>> + Send + 'static {
        let wants_answer = command.requires_answer();
        self.call_typed(Arc::new(command.clone()), args, PendingKind::Plain, wants_answer)
    }

    fn call_typed(
        &self,
        command: Arc<Command>,
        args: &Values,
        kind: PendingKind,
        wants_answer: bool,
    ) -> impl Future<Output = Result<Values, CallError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let waiter = wants_answer.then(|| Waiter::Typed { command: Arc::clone(&command), tx });
        let sent = self.shared.send_command(Request::Typed(&command, args), waiter, kind);
        async move {
            sent?;
            if !wants_answer {
                return Ok(Values::new());
            }
            rx.await.unwrap_or_else(|_| Err(dropped()))
        }
    }

    /// Call a command by name with a hand-built argument box.
    ///
    /// Resolves to the whole answer box, or `None` when no answer was asked
    /// for. Error boxes surface as [`CallError::Remote`] carrying an
    /// [`amp_core::RemoteError`] (or [`amp_core::UnhandledCommand`]).
    pub fn call_remote_raw(
        &self,
        name: &str,
        args: AmpBox,
        requires_answer: bool,
    ) -> impl Future<Output = Result<Option<AmpBox>, CallError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let waiter = requires_answer.then(|| Waiter::Raw(tx));
        let sent = self.shared.send_command(Request::Raw(name, args), waiter, PendingKind::Plain);
        async move {
            sent?;
            if !requires_answer {
                return Ok(None);
            }
            rx.await.unwrap_or_else(|_| Err(dropped())).map(Some)
        }
    }

    /// Upgrade the connection to TLS as the client side.
    ///
    /// Boxes sent after this call are held until the handshake completes.
    /// Resolves once the handshake is done; a handshake failure ends the
    /// connection.
    pub fn start_tls(
        &self,
        options: TlsClientOptions,
    ) -> impl Future<Output = Result<(), CallError>> + Send + 'static {
        let call =
            self.call_typed(Arc::new(builtin::start_tls()), &Values::new(), PendingKind::StartTls(options), true);
        async move { call.await.map(|_| ()) }
    }

    /// Call `command` and, on success, hand the connection to a protocol
    /// built by `factory`.
    ///
    /// No further boxes may be sent once this is called; an error answer
    /// releases the connection again.
    pub fn call_switch(
        &self,
        command: &Command,
        args: &Values,
        factory: Arc<dyn InnerProtocolFactory>,
    ) -> impl Future<Output = Result<Values, CallError>> + Send + 'static {
        self.call_typed(Arc::new(command.clone()), args, PendingKind::Switch(factory), true)
    }

    /// Queue a fully formed box.
    pub fn send_box(&self, outgoing: impl Into<Outgoing>) -> Result<(), SendError> {
        self.shared.send_box(outgoing.into())
    }

    /// Close once already queued boxes have been written.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Wait until the connection has ended.
    pub async fn closed(&self) -> ConnectionLost {
        let mut lost = self.shared.subscribe_lost();
        let reason = match lost.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(ConnectionLost::Shutdown),
            Err(_) => ConnectionLost::Shutdown,
        };
        reason
    }

    /// Why the connection ended, if it has.
    pub fn lost(&self) -> Option<ConnectionLost> {
        self.shared.state.lock().lost.clone()
    }

    pub fn is_tls_active(&self) -> bool {
        !matches!(self.shared.state.lock().tls, TlsPhase::Plain)
    }

    /// Certificates the peer presented, once TLS is up.
    pub fn peer_certificates(&self) -> Option<Vec<CertificateDer<'static>>> {
        self.shared.state.lock().peer_certificates.clone()
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    pub fn host(&self) -> &str {
        &self.shared.host
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
