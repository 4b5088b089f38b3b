// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! amp-core: boxes, argument codecs and command schemas for the AMP wire
//! protocol. Nothing in this crate touches I/O.

pub mod macros;

pub mod amp_box;
pub mod argument;
pub mod command;
pub mod decimal;
pub mod error;
pub mod keys;
pub mod parser;
pub mod remote;
pub mod value;

pub use amp_box::{escape, parse_boxes, AmpBox, BoxKind};
pub use argument::{
    decode_values, encode_values, Argument, ArgumentKind, CodecContext, NoDescriptors,
};
pub use command::{Command, CommandBuilder, DeclaredError, DynError, ErrorMapping};
pub use decimal::{Decimal, DecimalParseError};
pub use error::{BoxError, CodecError, FramingError, RequestError, SignatureError};
pub use parser::{BoxParser, ParseState};
pub use remote::{RemoteError, RemoteErrorType, UnhandledCommand, UnknownRemoteError};
pub use value::{Value, Values};
