// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reserved box keys, error codes and wire limits.

/// Correlation tag on a command that expects an answer.
pub const ASK: &[u8] = b"_ask";
/// Correlation tag on a successful response.
pub const ANSWER: &[u8] = b"_answer";
/// Wire name of the command being invoked.
pub const COMMAND: &[u8] = b"_command";
/// Correlation tag on an error response.
pub const ERROR: &[u8] = b"_error";
pub const ERROR_CODE: &[u8] = b"_error_code";
pub const ERROR_DESCRIPTION: &[u8] = b"_error_description";

/// Code sent when a responder fails with an undeclared error.
pub const UNKNOWN_ERROR_CODE: &[u8] = b"UNKNOWN";
/// Code sent when no responder exists for a command.
pub const UNHANDLED_ERROR_CODE: &[u8] = b"UNHANDLED";

/// Longest key allowed on the wire.
pub const MAX_KEY_LENGTH: usize = 0xFF;
/// Longest value allowed on the wire.
pub const MAX_VALUE_LENGTH: usize = 0xFFFF;

/// Whether `key` is one of the protocol's own keys rather than an argument.
pub fn is_reserved(key: &[u8]) -> bool {
    matches!(key, ASK | ANSWER | COMMAND | ERROR | ERROR_CODE | ERROR_DESCRIPTION)
}
