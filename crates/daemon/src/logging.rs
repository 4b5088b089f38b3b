// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup: daily-rolling files when a log directory is configured,
//! stderr otherwise.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::env;
use crate::lifecycle::DaemonError;

const LOG_FILE_PREFIX: &str = "ampd.log";

/// Flushes buffered log lines when dropped. Hold it for the life of the process.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init(log_dir: Option<&Path>) -> Result<LogGuard, DaemonError> {
    let filter = EnvFilter::try_new(env::log_filter())
        .map_err(|e| DaemonError::Logging(format!("bad log filter: {e}")))?;

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .map_err(|e| DaemonError::Logging(e.to_string()))?;
            Ok(LogGuard { _guard: Some(guard) })
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| DaemonError::Logging(e.to_string()))?;
            Ok(LogGuard { _guard: None })
        }
    }
}
