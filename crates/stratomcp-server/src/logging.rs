//! Process-level logging initialization.
//!
//! Diagnostics go through `tracing`; this module wires the subscriber.
//! For stdio servers stdout is the protocol channel, so everything is
//! written to stderr — [`init_stderr`] is safe for both transports.
//! `RUST_LOG` overrides the default filter when set.

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize stderr logging with the given default filter
/// (e.g. `"info"` or `"stratomcp_server=debug"`)
pub fn init_stderr(default_filter: &str) -> io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}

/// Initialize stderr logging with JSON output (log shippers)
pub fn init_stderr_json(default_filter: &str) -> io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(io::stderr))
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_initialization_is_an_error_not_a_panic() {
        let first = init_stderr("info");
        let second = init_stderr("debug");
        // Whichever call came second (tests share the process) must fail
        // cleanly.
        assert!(first.is_err() || second.is_err());
    }
}
