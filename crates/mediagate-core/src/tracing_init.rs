//! Tracing/logging initialization for the gateway binary.
//!
//! Worker stdout/stderr is relayed through the same subscriber, so a single
//! filter governs both gateway and worker output.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise both gateway crates log at
/// `log_level`. With `log_json` every event is one JSON object per line.
pub fn init_tracing(log_level: &str, log_json: bool) -> Result<()> {
    let env_filter = std::env::var("RUST_LOG")
        .map_or_else(|_| EnvFilter::new(default_filter(log_level)), EnvFilter::new);
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    result.map_err(|e| Error::Tracing(e.to_string()))
}

/// Filter directive applying `level` to both gateway crates.
pub fn default_filter(level: &str) -> String {
    format!("mediagate_gateway={level},mediagate_core={level}")
}
