//! Tracing setup for binaries and tests.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs anything, and
/// an already-installed subscriber from elsewhere is left alone.
///
/// ```rust,no_run
/// nostr_client::init_tracing();
/// tracing::warn!("relay unreachable");
/// ```
pub fn init_tracing() {
    init_with_filter(DEFAULT_FILTER);
}

pub fn init_with_filter(default_filter: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init();
    });
}

/// Like [`init_tracing`] but writes through the test harness so output is
/// captured per test.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_test_writer())
            .try_init();
    });
}
