//! portcullis/src/logging.rs
//! Logging initialization.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static LOG_INIT: Once = Once::new();

/// Initialize logging once; `RUST_LOG` overrides the provided default filter.
pub fn init_logging(default: &str) {
    LOG_INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        fmt().with_env_filter(filter).init();
    });
}
