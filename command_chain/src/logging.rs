//! Development-time tracing for the chain engine.
//!
//! Diagnostics only, via `RUST_LOG` to stderr. Everything the end user sees
//! (streamed answers, command results, errors) goes through
//! [`crate::chain::ChainCallback`] and is unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=command_chain=debug command-chain replay --history h.json --script s.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
