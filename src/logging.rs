//! Logging configuration using tracing
//!
//! Structured logging to stderr with support for the RUST_LOG environment variable.
//! Publishers only ever emit through `tracing` macros, so tests can install a
//! scoped subscriber with `tracing::subscriber::with_default` and observe events
//! without touching process-wide state.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// `default_level` is used when RUST_LOG is unset. The server passes `info` so
/// publish attempts are visible; one-shot CLI commands pass `warn`.
///
/// # Example RUST_LOG values
/// - `RUST_LOG=debug` - Show debug and above
/// - `RUST_LOG=statusrelay::integrations=trace` - Trace the platform clients only
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init(default_level: &str) -> crate::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .try_init()
        .map_err(|e| crate::RelayError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init("debug");
}
