use crate::trace::TraceId;
use std::collections::HashMap;

/// A reference from one span to a span in a separate, possibly
/// disconnected trace, together with contextual attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLink {
    /// The full 128-bit identifier of the linked trace.
    pub trace_id: TraceId,
    /// The identifier of the linked span.
    pub span_id: u64,
    /// Attributes describing the relationship.
    pub attributes: HashMap<String, String>,
    /// The raw tracestate header of the linked span, if any.
    pub trace_state: String,
    /// Propagation flags of the linked span.
    pub flags: u32,
}

impl SpanLink {
    /// Create a link to the span identified by `trace_id` / `span_id`.
    pub fn new(trace_id: TraceId, span_id: u64) -> Self {
        SpanLink {
            trace_id,
            span_id,
            ..SpanLink::default()
        }
    }
}
