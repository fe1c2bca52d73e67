//! Zero-cost tracing shims.
//!
//! With the `tracing` feature enabled these forward to the `tracing` crate;
//! without it (the default) they expand to nothing, so instrumented hot
//! paths carry no runtime cost. Only the levels the tree actually emits
//! (trace for per-node decisions, debug for structural changes) get a shim.
//!
//! ```bash
//! # Instrumented test run
//! RUST_LOG=leafline=trace cargo test --features tracing
//! ```

/// Trace-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
