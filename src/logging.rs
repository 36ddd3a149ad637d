//! Structured logging setup, matching the teacher's
//! `tracing`/`tracing-subscriber`/`tracing-appender` stack.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber. Call once from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
