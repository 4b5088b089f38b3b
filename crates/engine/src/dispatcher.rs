// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes incoming boxes: answers and errors to the calls waiting on them,
//! commands to responders.

use std::error::Error;
use std::sync::Arc;

use amp_core::keys::{
    ANSWER, ASK, COMMAND, ERROR, ERROR_CODE, ERROR_DESCRIPTION, UNHANDLED_ERROR_CODE,
    UNKNOWN_ERROR_CODE,
};
use amp_core::{escape, AmpBox, BoxKind, Command, DynError, RemoteError, UnhandledCommand, Values};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::{CallError, ConnectionLost, SendError};
use crate::framing::{AfterSend, Frame, ReceiveContext, SendContext, Shared, TlsPhase};
use crate::locator::{LocatedResponder, Locator, Reply, ResponderOutput};
use crate::outgoing::Outgoing;
use crate::protocol::AmpHandle;
use crate::switch::InnerProtocolFactory;
use crate::tls::TlsClientOptions;

/// Where the answer to an outstanding call goes.
pub(crate) enum Waiter {
    Typed { command: Arc<Command>, tx: oneshot::Sender<Result<Values, CallError>> },
    Raw(oneshot::Sender<Result<AmpBox, CallError>>),
}

/// What a successful answer does to the connection.
pub(crate) enum PendingKind {
    Plain,
    StartTls(TlsClientOptions),
    Switch(Arc<dyn InnerProtocolFactory>),
}

pub(crate) struct Pending {
    waiter: Waiter,
    kind: PendingKind,
}

impl Pending {
    pub fn fail(self, err: CallError, peer: &str) {
        if let PendingKind::Switch(factory) = &self.kind {
            factory.client_connection_failed(&err);
        }
        let resolution = match self.waiter {
            Waiter::Typed { tx, .. } => Resolution::Typed(tx, Err(err)),
            Waiter::Raw(tx) => Resolution::Raw(tx, Err(err)),
        };
        resolution.deliver(peer);
    }
}

/// A call's outcome, ready to hand to its caller.
pub(crate) enum Resolution {
    Typed(oneshot::Sender<Result<Values, CallError>>, Result<Values, CallError>),
    Raw(oneshot::Sender<Result<AmpBox, CallError>>, Result<AmpBox, CallError>),
}

impl Resolution {
    fn error(&self) -> Option<&CallError> {
        match self {
            Self::Typed(_, result) => result.as_ref().err(),
            Self::Raw(_, result) => result.as_ref().err(),
        }
    }

    pub fn deliver(self, peer: &str) {
        let delivered = match self {
            Self::Typed(tx, result) => tx.send(result).is_ok(),
            Self::Raw(tx, result) => tx.send(result).is_ok(),
        };
        if !delivered {
            warn!(peer, "caller went away before its answer arrived");
        }
    }

    pub fn fail(self, err: CallError, peer: &str) {
        let failed = match self {
            Self::Typed(tx, _) => Self::Typed(tx, Err(err)),
            Self::Raw(tx, _) => Self::Raw(tx, Err(err)),
        };
        failed.deliver(peer);
    }
}

/// Work the driver must do before it reads any further bytes.
pub(crate) enum Transition {
    ClientTls { options: TlsClientOptions, resolution: Resolution },
    Switch { factory: Arc<dyn InnerProtocolFactory>, resolution: Resolution },
}

/// An outgoing command, before encoding.
pub(crate) enum Request<'a> {
    Typed(&'a Command, &'a Values),
    Raw(&'a str, AmpBox),
}

impl Request<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Typed(command, _) => command.name(),
            Self::Raw(name, _) => name,
        }
    }
}

fn encode_command(
    request: &Request<'_>,
    tag: Option<&[u8]>,
    ctx: &mut SendContext<'_>,
) -> Result<(AmpBox, Vec<u8>), CallError> {
    let mut ampbox = match request {
        Request::Typed(command, values) => command.encode_request(values, ctx)?,
        Request::Raw(_, args) => args.clone(),
    };
    ampbox.insert(COMMAND, request.name());
    if let Some(tag) = tag {
        ampbox.insert(ASK, tag);
    }
    let bytes = ampbox.serialize().map_err(SendError::from)?;
    Ok((ampbox, bytes))
}

impl Shared {
    /// Encode, tag and queue a command under a single lock, so tags,
    /// descriptor ordinals and wire order agree.
    pub(crate) fn send_command(
        &self,
        request: Request<'_>,
        waiter: Option<Waiter>,
        kind: PendingKind,
    ) -> Result<(), CallError> {
        let mut state = self.state.lock();
        state.check_sendable()?;
        if matches!(kind, PendingKind::StartTls(_)) && !matches!(state.tls, TlsPhase::Plain) {
            return Err(SendError::OnlyOneTls.into());
        }

        let tag = waiter.as_ref().map(|_| state.next_tag());
        let mut ctx = SendContext::new(&mut state);
        let (ampbox, bytes) = match encode_command(&request, tag.as_deref(), &mut ctx) {
            Ok(encoded) => encoded,
            Err(e) => {
                ctx.rollback();
                return Err(e);
            }
        };
        let fds = ctx.finish();
        debug!(peer = %self.peer, %ampbox, "sending command");

        // Effects apply only to calls that wait for an answer.
        let waits = waiter.is_some();
        let locks = waits && matches!(kind, PendingKind::Switch(_));
        let starts_tls = waits && matches!(kind, PendingKind::StartTls(_));
        if let (Some(tag), Some(waiter)) = (tag, waiter) {
            state.outstanding.insert(tag, Pending { waiter, kind });
        }
        self.enqueue(&mut state, Frame::Box { bytes, fds, after: AfterSend::Nothing });
        if locks {
            state.locked = true;
        }
        if starts_tls {
            state.tls = TlsPhase::Preparing(Vec::new());
        }
        Ok(())
    }
}

/// Per-connection router for incoming boxes.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    handle: AmpHandle,
    locator: Locator,
}

enum Incoming {
    Answer(Vec<u8>),
    Error { tag: Vec<u8>, code: Vec<u8>, description: String },
    Command { name: Vec<u8>, ask: Option<Vec<u8>> },
}

impl Dispatcher {
    pub fn new(handle: AmpHandle, locator: Locator) -> Self {
        Self { handle, locator }
    }

    fn shared(&self) -> &Shared {
        self.handle.shared()
    }

    fn peer(&self) -> &str {
        &self.shared().peer
    }

    /// Handle one parsed box. An error ends the connection.
    pub fn receive(&self, incoming: AmpBox) -> Result<Option<Transition>, ConnectionLost> {
        let classified = match incoming.kind() {
            Ok(BoxKind::Answer(tag)) => Incoming::Answer(tag.to_vec()),
            Ok(BoxKind::Error(tag)) => Incoming::Error {
                tag: tag.to_vec(),
                code: incoming.get(ERROR_CODE).unwrap_or(UNKNOWN_ERROR_CODE).to_vec(),
                description: String::from_utf8_lossy(
                    incoming.get(ERROR_DESCRIPTION).unwrap_or_default(),
                )
                .into_owned(),
            },
            Ok(BoxKind::Command { name, ask }) => {
                Incoming::Command { name: name.to_vec(), ask: ask.map(<[u8]>::to_vec) }
            }
            Err(e) => return Err(ConnectionLost::Fatal(e.to_string())),
        };
        match classified {
            Incoming::Answer(tag) => self.answer_received(&tag, Ok(incoming)),
            Incoming::Error { tag, code, description } => {
                self.answer_received(&tag, Err((code, description)))
            }
            Incoming::Command { name, ask } => {
                self.command_received(name, ask, incoming);
                Ok(None)
            }
        }
    }

    fn answer_received(
        &self,
        tag: &[u8],
        outcome: Result<AmpBox, (Vec<u8>, String)>,
    ) -> Result<Option<Transition>, ConnectionLost> {
        let mut state = self.shared().state.lock();
        let Some(Pending { waiter, kind }) = state.outstanding.remove(tag) else {
            return Err(ConnectionLost::Fatal(format!("answer for unknown tag {}", escape(tag))));
        };

        let resolution = match waiter {
            Waiter::Typed { command, tx } => {
                let result = match outcome {
                    Ok(answer) => command
                        .decode_response(&answer, &mut ReceiveContext::new(&mut state))
                        .map_err(CallError::Decode),
                    Err((code, description)) => {
                        let error = command.rebuild_error(&code, description);
                        Err(CallError::Remote { code, error: Arc::from(error) })
                    }
                };
                Resolution::Typed(tx, result)
            }
            Waiter::Raw(tx) => {
                let result = outcome.map_err(|(code, description)| {
                    let error: Arc<dyn Error + Send + Sync> = if code == UNHANDLED_ERROR_CODE {
                        Arc::new(UnhandledCommand { description })
                    } else {
                        Arc::new(RemoteError::new(code.clone(), description))
                    };
                    CallError::Remote { code, error }
                });
                Resolution::Raw(tx, result)
            }
        };

        let failure = resolution.error().cloned();
        match (kind, failure) {
            (PendingKind::Plain, _) => {
                drop(state);
                resolution.deliver(self.peer());
                Ok(None)
            }
            (PendingKind::StartTls(options), None) => {
                Ok(Some(Transition::ClientTls { options, resolution }))
            }
            (PendingKind::StartTls(_), Some(_)) => {
                // Refused: boxes held for the handshake go out in plaintext.
                if let TlsPhase::Preparing(queued) =
                    std::mem::replace(&mut state.tls, TlsPhase::Plain)
                {
                    for frame in queued {
                        self.shared().enqueue(&mut state, frame);
                    }
                }
                drop(state);
                resolution.deliver(self.peer());
                Ok(None)
            }
            (PendingKind::Switch(factory), None) => {
                Ok(Some(Transition::Switch { factory, resolution }))
            }
            (PendingKind::Switch(factory), Some(failure)) => {
                state.locked = false;
                drop(state);
                factory.client_connection_failed(&failure);
                resolution.deliver(self.peer());
                Ok(None)
            }
        }
    }

    fn command_received(&self, name: Vec<u8>, ask: Option<Vec<u8>>, incoming: AmpBox) {
        let Some(responder) = self.locator.locate(&name) else {
            let description = format!("Unhandled Command: {}", escape(&name));
            warn!(peer = %self.peer(), command = %escape(&name), "no responder for command");
            if let Some(tag) = ask {
                self.emit(Outgoing::Plain(error_box(&tag, UNHANDLED_ERROR_CODE, &description)));
            }
            return;
        };

        let (command, output) = match responder {
            LocatedResponder::Typed { command, handler } => {
                let decoded = {
                    let mut state = self.shared().state.lock();
                    command.decode_request(&incoming, &mut ReceiveContext::new(&mut state))
                };
                let output = match decoded {
                    Ok(args) => handler(args, &self.handle),
                    Err(e) => ResponderOutput::err(e),
                };
                (Some(command), output)
            }
            LocatedResponder::Raw(handler) => (None, handler(incoming, &self.handle)),
        };

        match output {
            ResponderOutput::Ready(result) => self.finish_command(command, &name, ask, result),
            ResponderOutput::Pending(future) => {
                let this = self.clone();
                tokio::spawn(async move {
                    let result = future.await;
                    this.finish_command(command, &name, ask, result);
                });
            }
        }
    }

    fn finish_command(
        &self,
        command: Option<Arc<Command>>,
        name: &[u8],
        ask: Option<Vec<u8>>,
        result: Result<Reply, DynError>,
    ) {
        let Some(tag) = ask else {
            if let Err(err) = result {
                self.unanswered_failure(command.as_deref(), name, &*err);
            }
            return;
        };
        match result {
            Ok(reply) => self.send_reply(command.as_deref(), name, &tag, reply),
            Err(err) => self.send_error(command.as_deref(), name, &tag, &*err),
        }
    }

    /// A command sent without `_ask` failed; nobody is waiting for the error.
    fn unanswered_failure(
        &self,
        command: Option<&Command>,
        name: &[u8],
        err: &(dyn Error + Send + Sync + 'static),
    ) {
        let declared = command.and_then(|c| c.error_for(err)).is_some()
            || err.downcast_ref::<RemoteError>().is_some();
        if declared {
            warn!(peer = %self.peer(), command = %escape(name), error = %err, "unanswered command failed");
        } else {
            error!(peer = %self.peer(), command = %escape(name), error = %err, "unhandled error in unanswered command");
            self.shared().close();
        }
    }

    fn send_reply(&self, command: Option<&Command>, name: &[u8], tag: &[u8], reply: Reply) {
        let mut state = self.shared().state.lock();
        let mut ctx = SendContext::new(&mut state);
        let encoded = match reply {
            Reply::Values(values) => match command {
                Some(command) => command
                    .encode_response(&values, &mut ctx)
                    .map(Outgoing::Plain)
                    .map_err(|e| e.to_string()),
                None => Err("raw responders must reply with a box".to_string()),
            },
            Reply::Box(ampbox) => Ok(Outgoing::Plain(ampbox)),
            Reply::StartTls(options) => Ok(Outgoing::UpgradeTls(AmpBox::new(), options)),
            Reply::SwitchTo(protocol) => Ok(Outgoing::SwitchTo(AmpBox::new(), protocol)),
        };

        let mut outgoing = match encoded {
            Ok(outgoing) => outgoing,
            Err(reason) => {
                ctx.rollback();
                drop(state);
                error!(peer = %self.peer(), command = %escape(name), %reason, "bad local return value");
                self.emit(Outgoing::CloseAfterSend(unknown_error_box(tag)));
                return;
            }
        };
        let fds = ctx.finish();
        match &mut outgoing {
            Outgoing::Plain(b)
            | Outgoing::CloseAfterSend(b)
            | Outgoing::SwitchTo(b, _)
            | Outgoing::UpgradeTls(b, _) => {
                b.insert(ANSWER, tag);
            }
        }

        match self.shared().push_box(&mut state, outgoing, fds) {
            Ok(()) | Err(SendError::Switched | SendError::ConnectionLost(_)) => {}
            Err(e) => {
                drop(state);
                error!(peer = %self.peer(), command = %escape(name), error = %e, "cannot send answer");
                self.emit(Outgoing::CloseAfterSend(unknown_error_box(tag)));
            }
        }
    }

    fn send_error(
        &self,
        command: Option<&Command>,
        name: &[u8],
        tag: &[u8],
        err: &(dyn Error + Send + Sync + 'static),
    ) {
        let (code, description, fatal) =
            if let Some(declared) = command.and_then(|c| c.error_for(err)) {
                (declared.code.to_vec(), err.to_string(), declared.fatal)
            } else if let Some(remote) = err.downcast_ref::<RemoteError>() {
                (remote.code.clone(), remote.description.clone(), remote.fatal)
            } else {
                error!(peer = %self.peer(), command = %escape(name), error = %err, "unhandled error in responder");
                (UNKNOWN_ERROR_CODE.to_vec(), "Unknown Error".to_string(), true)
            };

        let ampbox = error_box(tag, &code, &description);
        self.emit(if fatal { Outgoing::CloseAfterSend(ampbox) } else { Outgoing::Plain(ampbox) });
    }

    /// Send, ignoring failures caused by the connection going away.
    fn emit(&self, outgoing: Outgoing) {
        match self.shared().send_box(outgoing) {
            Ok(()) | Err(SendError::Switched | SendError::ConnectionLost(_)) => {}
            Err(e) => error!(peer = %self.peer(), error = %e, "cannot send reply"),
        }
    }
}

fn error_box(tag: &[u8], code: &[u8], description: &str) -> AmpBox {
    let mut ampbox = AmpBox::new();
    ampbox.insert(ERROR, tag);
    ampbox.insert(ERROR_CODE, code);
    ampbox.insert(ERROR_DESCRIPTION, description);
    ampbox
}

fn unknown_error_box(tag: &[u8]) -> AmpBox {
    error_box(tag, UNKNOWN_ERROR_CODE, "Unknown Error")
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
