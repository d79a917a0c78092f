//! # Tracekit
//!
//! The in-process core of a distributed-tracing client. This crate tracks
//! the lifecycle of a single trace (a tree of spans spanning process and
//! network boundaries), decides whether that trace should be sampled, and
//! determines when completed spans are handed off to an external submission
//! sink, possibly several times per trace (partial flush).
//!
//! The crate deliberately stops at the submission boundary: serialization,
//! batching and transport belong to the sink implementation, which is
//! injected into the [`trace::Tracer`] together with the other
//! collaborators (live configuration, telemetry counters, process
//! metadata).
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

mod internal_logging;
pub mod trace;

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
