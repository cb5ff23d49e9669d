//! Logging setup
//!
//! Output goes to stderr so command results on stdout stay machine-readable.

use tracing_subscriber::prelude::*;

/// Install a `RUST_LOG`-driven fmt subscriber, with a default filter when unset
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let default_filter = if cfg!(debug_assertions) {
        "info,listing_map_lib=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized");
}
