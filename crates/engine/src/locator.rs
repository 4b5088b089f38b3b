// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command name to responder lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use amp_core::{AmpBox, Command, DynError, Values};
use futures_util::future::BoxFuture;

use crate::protocol::AmpHandle;
use crate::switch::InnerProtocol;
use crate::tls::TlsServerOptions;

/// What a responder produced on success.
pub enum Reply {
    /// Encoded with the command's response schema.
    Values(Values),
    /// Sent as-is (plus `_answer`). Raw responders answer this way.
    Box(AmpBox),
    /// Answer, then run the server side of a TLS handshake.
    StartTls(TlsServerOptions),
    /// Answer, then hand the connection to this protocol.
    SwitchTo(Box<dyn InnerProtocol>),
}

impl From<Values> for Reply {
    fn from(values: Values) -> Self {
        Self::Values(values)
    }
}

impl From<AmpBox> for Reply {
    fn from(ampbox: AmpBox) -> Self {
        Self::Box(ampbox)
    }
}

/// A responder's result, available now or later.
pub enum ResponderOutput {
    Ready(Result<Reply, DynError>),
    Pending(BoxFuture<'static, Result<Reply, DynError>>),
}

impl ResponderOutput {
    pub fn ok(reply: impl Into<Reply>) -> Self {
        Self::Ready(Ok(reply.into()))
    }

    pub fn err(error: impl Into<DynError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    /// Finish the command when `future` resolves. Other boxes keep flowing
    /// in the meantime.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Reply, DynError>> + Send + 'static,
    {
        Self::Pending(Box::pin(future))
    }
}

impl<T: Into<Reply>, E: Into<DynError>> From<Result<T, E>> for ResponderOutput {
    fn from(result: Result<T, E>) -> Self {
        Self::Ready(result.map(Into::into).map_err(Into::into))
    }
}

pub type Handler = dyn Fn(Values, &AmpHandle) -> ResponderOutput + Send + Sync;
pub type RawHandler = dyn Fn(AmpBox, &AmpHandle) -> ResponderOutput + Send + Sync;

#[derive(Clone)]
struct TypedEntry {
    command: Arc<Command>,
    handler: Arc<Handler>,
}

/// A responder found for an incoming command.
pub enum LocatedResponder {
    /// Arguments are decoded with `command` before the handler runs.
    Typed { command: Arc<Command>, handler: Arc<Handler> },
    /// The handler sees the whole box.
    Raw(Arc<RawHandler>),
}

/// Immutable table of responders, shared by every connection of an endpoint.
///
/// Typed responders take precedence over raw ones registered under the same
/// name.
#[derive(Clone, Default)]
pub struct Locator {
    typed: HashMap<Vec<u8>, TypedEntry>,
    raw: HashMap<Vec<u8>, Arc<RawHandler>>,
}

impl Locator {
    pub fn builder() -> LocatorBuilder {
        LocatorBuilder::default()
    }

    pub fn locate(&self, name: &[u8]) -> Option<LocatedResponder> {
        if let Some(entry) = self.typed.get(name) {
            return Some(LocatedResponder::Typed {
                command: Arc::clone(&entry.command),
                handler: Arc::clone(&entry.handler),
            });
        }
        self.raw.get(name).map(|handler| LocatedResponder::Raw(Arc::clone(handler)))
    }

    /// Wire names with a responder, in no particular order.
    pub fn commands(&self) -> impl Iterator<Item = &[u8]> {
        self.typed.keys().chain(self.raw.keys()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.typed.len() + self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct LocatorBuilder {
    locator: Locator,
}

impl LocatorBuilder {
    /// Register `handler` for `command`. A later registration for the same
    /// name replaces an earlier one.
    pub fn responder<F>(mut self, command: &Command, handler: F) -> Self
    where
        F: Fn(Values, &AmpHandle) -> ResponderOutput + Send + Sync + 'static,
    {
        let entry = TypedEntry { command: Arc::new(command.clone()), handler: Arc::new(handler) };
        self.locator.typed.insert(command.name().as_bytes().to_vec(), entry);
        self
    }

    /// Register a responder that receives the undecoded box.
    pub fn raw<F>(mut self, name: impl Into<Vec<u8>>, handler: F) -> Self
    where
        F: Fn(AmpBox, &AmpHandle) -> ResponderOutput + Send + Sync + 'static,
    {
        self.locator.raw.insert(name.into(), Arc::new(handler));
        self
    }

    /// Inherit every responder of `parent` this builder does not define.
    pub fn extend(mut self, parent: &Locator) -> Self {
        for (name, entry) in &parent.typed {
            self.locator.typed.entry(name.clone()).or_insert_with(|| entry.clone());
        }
        for (name, handler) in &parent.raw {
            self.locator.raw.entry(name.clone()).or_insert_with(|| Arc::clone(handler));
        }
        self
    }

    pub fn build(self) -> Locator {
        self.locator
    }
}

#[cfg(test)]
#[path = "locator_tests.rs"]
mod tests;
