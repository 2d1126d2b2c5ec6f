//! # Structured Logging
//!
//! Environment-aware structured logging for hosts embedding the dispatch
//! core. Console output by default, JSON when `COURIER_LOG_FORMAT=json`.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize structured logging once per process. Safe to call from
/// multiple hosts; a subscriber installed elsewhere is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let json = std::env::var("COURIER_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_target(true))
                .with(env_filter())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(env_filter())
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already initialized; continuing");
        }
    });
}
