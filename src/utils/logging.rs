//! Logging initialization
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host application's call. These helpers give hosts a consistent setup:
//! - Respects RUST_LOG environment variable
//! - Falls back to the filter from [`LoggingConfig`], then to "info"
//! - Respects NO_COLOR
//!
//! # Usage
//! ```rust,no_run
//! use bundle_loader::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info";

/// Pick the filter: RUST_LOG, then the given filter, then "info"
fn build_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER))
}

/// Initialize logging
///
/// # Arguments
/// * `filter` - Optional filter (e.g. "debug", "bundle_loader::module=trace").
///   Ignored when RUST_LOG is set.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(build_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging from the `[logging]` section of a [`crate::config::LoaderConfig`]
pub fn init_logging_from_config(config: Option<&LoggingConfig>) -> bool {
    init_logging(config.and_then(|c| c.filter.as_deref()))
}
