//! # Trace core
//!
//! The trace core consists of a few main structs:
//!
//! * The [`Tracer`] struct, which starts spans and owns the injected
//!   collaborators.
//! * The [`SpanHandle`] struct, through which a caller tags and finishes
//!   one span.
//! * The [`SpanContext`] struct, the propagatable state shared with
//!   descendants and remote peers.
//! * The [`TraceBuffer`] struct, shared by all spans of one trace, which
//!   runs the finish and partial-flush protocol and hands completed
//!   [`Chunk`]s to the configured [`ChunkSink`].

mod buffer;
mod chunk;
mod config;
mod links;
mod metadata;
mod peer_service;
mod sampling;
mod span;
mod span_context;
mod stats;
pub mod tags;
mod trace_id;
mod tracer;

pub use buffer::{TraceBuffer, DEFAULT_MAX_SPANS_PER_TRACE};
pub use chunk::{Chunk, ChunkSink, InMemoryChunkSink};
pub use config::{ConfigProvider, FixedConfig, TracerConfig};
pub use links::SpanLink;
pub use metadata::{MetadataProvider, NoMetadata};
pub use sampling::{
    SamplerName, SamplingDecision, PRIORITY_AUTO_KEEP, PRIORITY_AUTO_REJECT, PRIORITY_USER_KEEP,
    PRIORITY_USER_REJECT,
};
pub use span::Span;
pub use span_context::{
    ForeignSpanContext, ForeignSpanContextExt, OptionSpanContextExt, SpanContext,
};
pub use stats::{NoopStatsSink, RecordingStatsSink, Stat, StatsSink};
pub use trace_id::{ParseTraceIdError, TraceId, TRACE_ID_ZERO};
pub use tracer::{SpanBuilder, SpanHandle, SpanObserver, Tracer, TracerBuilder, TracerHooks};
