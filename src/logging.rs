//! Structured logging: `tracing` + `tracing-subscriber`, env-filter driven,
//! with `SV_DEBUG` forcing the most verbose level as specified for the
//! control protocol's external interface.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::format::PrettyFields;
use tracing_subscriber::EnvFilter;

const SV_DEBUG_ENV: &str = "SV_DEBUG";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to install global logging subscriber")]
    AlreadyInit,
}

/// Installs the global `tracing` subscriber. `SV_DEBUG` (any nonempty
/// value) forces `trace`-level output regardless of `RUST_LOG`.
pub fn init() -> Result<(), LoggingError> {
    let forced_verbose = std::env::var(SV_DEBUG_ENV)
        .map(|v| !v.is_empty())
        .unwrap_or(false);

    let default_level = if forced_verbose {
        Level::TRACE
    } else {
        Level::INFO
    };

    let env_filter = if forced_verbose {
        EnvFilter::new("trace")
    } else {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    };

    tracing_subscriber::fmt()
        .with_max_level(default_level)
        .with_env_filter(env_filter)
        .fmt_fields(PrettyFields::new())
        .try_init()
        .map_err(|_| LoggingError::AlreadyInit)
}
