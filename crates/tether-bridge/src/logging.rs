//! Conditional logging macros.
//!
//! With the `logging` feature these forward to `tracing`; without it they
//! expand to nothing, so call sites cost nothing in default builds.
//!
//! ```rust,ignore
//! use crate::logging::{debug, trace};
//!
//! debug!(class = %name, "registered class");
//! trace!(symbol, depth, "chain lookup");
//! ```

/// Very detailed internal operations (per lookup, per handle).
#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

/// Registration and collection events.
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Unexpected but handled situations, e.g. a native panic caught at the call boundary.
#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug as debug;
pub(crate) use log_trace as trace;
pub(crate) use log_warn as warn;
