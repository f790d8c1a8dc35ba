//! Log subscriber setup
//!
//! `RUST_LOG` takes precedence over the level derived from `-v`/`-q`.

use crate::config::Verbosity;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter for a verbosity level
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()))
}

/// Install the global subscriber, writing to stderr
///
/// A second call is a no-op.
pub fn init_logging(verbosity: Verbosity, json: bool, ansi: bool) {
    let registry = tracing_subscriber::registry().with(env_filter(verbosity));
    // try_init fails only when a subscriber is already set
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(ansi)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}
