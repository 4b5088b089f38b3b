// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands served by `ampd`.

use amp_core::{Argument, Command, DynError, Value, Values};
use amp_engine::{Locator, ResponderOutput};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use thiserror::Error;

amp_core::remote_error! {
    /// Division by zero.
    pub struct ZeroDivision;
}

/// A responder ran without an argument its schema requires.
#[derive(Debug, Error)]
#[error("missing argument {0}")]
pub struct MissingArgument(&'static str);

pub fn sum() -> Command {
    Command::builder("Sum")
        .argument("a", Argument::integer())
        .argument("b", Argument::integer())
        .response("total", Argument::integer())
        .build()
}

pub fn divide() -> Command {
    Command::builder("Divide")
        .argument("numerator", Argument::integer())
        .argument("denominator", Argument::integer())
        .response("result", Argument::float())
        .error::<ZeroDivision>("ZERO_DIV")
        .build()
}

pub fn echo() -> Command {
    Command::builder("Echo")
        .argument("text", Argument::text())
        .response("text", Argument::text())
        .build()
}

fn integer<'a>(args: &'a Values, name: &'static str) -> Result<&'a BigInt, MissingArgument> {
    args.get(name).and_then(Value::as_integer).ok_or(MissingArgument(name))
}

fn add(args: &Values) -> Result<Values, MissingArgument> {
    let total = integer(args, "a")? + integer(args, "b")?;
    Ok(Values::new().with("total", total))
}

fn div(args: &Values) -> Result<Values, DynError> {
    let numerator = integer(args, "numerator")?;
    let denominator = integer(args, "denominator")?;
    if denominator.is_zero() {
        return Err(ZeroDivision("integer division or modulo by zero".to_string()).into());
    }
    // Out-of-range operands saturate to infinity.
    let as_float = |n: &BigInt| n.to_f64().unwrap_or(f64::NAN);
    Ok(Values::new().with("result", as_float(numerator) / as_float(denominator)))
}

/// Responder table for every `ampd` connection.
pub fn locator() -> Locator {
    Locator::builder()
        .responder(&sum(), |args, _| add(&args).into())
        .responder(&divide(), |args, _| div(&args).into())
        .responder(&echo(), |args, _| {
            let text = args.text("text").unwrap_or_default().to_string();
            ResponderOutput::ok(Values::new().with("text", text))
        })
        .build()
}

#[cfg(test)]
#[path = "responders_tests.rs"]
mod tests;
