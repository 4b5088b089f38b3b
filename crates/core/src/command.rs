// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command schemas.
//!
//! A [`Command`] names a remote operation, the arguments it takes, the
//! response it produces and the error types it may fail with. Schemas are
//! immutable once built; a derived schema starts from a copy of its parent
//! and may add arguments, response fields and error mappings.

use std::any::{type_name, TypeId};
use std::error::Error;
use std::fmt;

use crate::amp_box::AmpBox;
use crate::argument::{decode_values, encode_values, Argument, CodecContext};
use crate::error::{CodecError, RequestError, SignatureError};
use crate::keys::UNHANDLED_ERROR_CODE;
use crate::remote::{RemoteErrorType, UnhandledCommand, UnknownRemoteError};
use crate::value::Values;

/// Boxed error produced by responders and rebuilt on the calling side.
pub type DynError = Box<dyn Error + Send + Sync + 'static>;

/// One declared error type and the code it travels under.
#[derive(Clone)]
pub struct ErrorMapping {
    code: Vec<u8>,
    type_id: TypeId,
    type_name: &'static str,
    fatal: bool,
    matches: fn(&(dyn Error + Send + Sync + 'static)) -> bool,
    rebuild: fn(String) -> DynError,
}

impl ErrorMapping {
    fn of<E: RemoteErrorType>(code: Vec<u8>, fatal: bool) -> Self {
        Self {
            code,
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
            fatal,
            matches: |err| err.is::<E>(),
            rebuild: |description| Box::new(E::from_description(description)),
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether raising this error closes the responder's connection.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl fmt::Debug for ErrorMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMapping")
            .field("code", &crate::amp_box::escape(&self.code))
            .field("type", &self.type_name)
            .field("fatal", &self.fatal)
            .finish()
    }
}

/// A declared error matched against a responder failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredError<'a> {
    pub code: &'a [u8],
    pub fatal: bool,
}

#[derive(Debug, Clone)]
pub struct Command {
    name: String,
    arguments: Vec<(String, Argument)>,
    response: Vec<(String, Argument)>,
    errors: Vec<ErrorMapping>,
    requires_answer: bool,
}

impl Command {
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            command: Command {
                name: name.into(),
                arguments: Vec::new(),
                response: Vec::new(),
                errors: Vec::new(),
                requires_answer: true,
            },
        }
    }

    /// Start a schema from a copy of `parent`, under a new name.
    ///
    /// The child inherits arguments, response fields and every error
    /// mapping; mappings added to the child override inherited ones that
    /// share a code or an error type.
    pub fn derive(name: impl Into<String>, parent: &Command) -> CommandBuilder {
        let mut command = parent.clone();
        command.name = name.into();
        CommandBuilder { command }
    }

    /// Wire name sent under `_command`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[(String, Argument)] {
        &self.arguments
    }

    pub fn response(&self) -> &[(String, Argument)] {
        &self.response
    }

    pub fn errors(&self) -> &[ErrorMapping] {
        &self.errors
    }

    /// Whether callers wait for an answer. Responders always produce one
    /// when asked.
    pub fn requires_answer(&self) -> bool {
        self.requires_answer
    }

    /// Check the argument names against the schema, then encode them.
    pub fn encode_request(
        &self,
        values: &Values,
        ctx: &mut dyn CodecContext,
    ) -> Result<AmpBox, RequestError> {
        let missing: Vec<String> = self
            .arguments
            .iter()
            .filter(|(name, arg)| !arg.is_optional() && values.get(name).is_none())
            .map(|(name, _)| name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(SignatureError::Missing { command: self.name.clone(), missing }.into());
        }
        if let Some(unknown) =
            values.names().find(|given| !self.arguments.iter().any(|(name, _)| name == given))
        {
            return Err(SignatureError::Unknown {
                command: self.name.clone(),
                argument: unknown.to_string(),
            }
            .into());
        }

        let mut out = AmpBox::new();
        encode_values(&self.arguments, values, &mut out, ctx)?;
        Ok(out)
    }

    pub fn decode_request(
        &self,
        input: &AmpBox,
        ctx: &mut dyn CodecContext,
    ) -> Result<Values, CodecError> {
        decode_values(&self.arguments, input, ctx)
    }

    /// Encode a responder's result. Names outside the response schema are
    /// ignored.
    pub fn encode_response(
        &self,
        values: &Values,
        ctx: &mut dyn CodecContext,
    ) -> Result<AmpBox, CodecError> {
        let mut out = AmpBox::new();
        encode_values(&self.response, values, &mut out, ctx)?;
        Ok(out)
    }

    pub fn decode_response(
        &self,
        input: &AmpBox,
        ctx: &mut dyn CodecContext,
    ) -> Result<Values, CodecError> {
        decode_values(&self.response, input, ctx)
    }

    /// Find the declared mapping for a responder failure.
    pub fn error_for(&self, err: &(dyn Error + Send + Sync + 'static)) -> Option<DeclaredError<'_>> {
        self.errors
            .iter()
            .rev()
            .find(|mapping| (mapping.matches)(err))
            .map(|mapping| DeclaredError { code: &mapping.code, fatal: mapping.fatal })
    }

    /// Rebuild the local error for a received error code.
    ///
    /// `UNHANDLED` always yields [`UnhandledCommand`]; codes the schema does
    /// not declare yield [`UnknownRemoteError`].
    pub fn rebuild_error(&self, code: &[u8], description: String) -> DynError {
        if code == UNHANDLED_ERROR_CODE {
            return Box::new(UnhandledCommand::from_description(description));
        }
        match self.errors.iter().rev().find(|mapping| mapping.code == code) {
            Some(mapping) => (mapping.rebuild)(description),
            None => Box::new(UnknownRemoteError { code: code.to_vec(), description }),
        }
    }
}

pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    pub fn argument(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.command.arguments.push((name.into(), argument));
        self
    }

    pub fn response(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.command.response.push((name.into(), argument));
        self
    }

    /// Declare `E` as a recoverable error sent under `code`.
    pub fn error<E: RemoteErrorType>(self, code: impl Into<Vec<u8>>) -> Self {
        self.map_error(ErrorMapping::of::<E>(code.into(), false))
    }

    /// Declare `E` as an error that closes the connection after it is sent.
    pub fn fatal_error<E: RemoteErrorType>(self, code: impl Into<Vec<u8>>) -> Self {
        self.map_error(ErrorMapping::of::<E>(code.into(), true))
    }

    pub fn requires_answer(mut self, requires_answer: bool) -> Self {
        self.command.requires_answer = requires_answer;
        self
    }

    pub fn build(self) -> Command {
        self.command
    }

    fn map_error(mut self, mapping: ErrorMapping) -> Self {
        self.command
            .errors
            .retain(|existing| existing.type_id != mapping.type_id && existing.code != mapping.code);
        self.command.errors.push(mapping);
        self
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
