//! Shared test utilities: tracing setup.
//!
//! ```bash
//! # Watch rebalancing decisions while a test runs
//! RUST_LOG=leafline=trace cargo test --features tracing -- stress
//! ```

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize a console tracing subscriber once per test binary.
///
/// Safe to call from every test; only the first call takes effect. The
/// filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .try_init();
    });
}
