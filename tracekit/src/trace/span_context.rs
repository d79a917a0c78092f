//! # Span context
//!
//! The propagatable state attached to one span: identifiers, baggage,
//! origin and span links, plus the shared reference to the trace buffer
//! that links sibling contexts of the same trace together.
//!
//! A context is created exactly once per span, at span-start time, and is
//! never reused across spans. Baggage lives behind its own read/write
//! lock, decoupled from the trace buffer's lock, with a lock-free flag
//! short-circuiting the common case of a span that never carries baggage.

use crate::trace::buffer::TraceBuffer;
use crate::trace::tracer::TracerHooks;
use crate::trace::{
    SamplerName, SamplingDecision, Span, SpanLink, TraceId, TRACE_ID_ZERO,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

/// Span state that can propagate to descendant spans and across process
/// boundaries. It contains all the information needed to spawn a direct
/// descendant of the span it belongs to.
#[derive(Debug)]
pub struct SpanContext {
    // Tracks changes made after creation by extraction/propagation code,
    // as opposed to plain initialization.
    updated: bool,

    trace: Option<Arc<TraceBuffer>>,
    span: Option<Arc<Span>>,
    errors: AtomicI32,

    // The 16-character hex string of the last parent span identifier seen
    // on the upstream side. The backend uses it to reparent spans whose
    // parent was propagated by a foreign tracer and never submitted.
    reparent_id: Option<String>,
    is_remote: bool,

    trace_id: TraceId,
    span_id: u64,

    baggage: RwLock<HashMap<String, String>>,
    // Checked before the baggage lock so reads stay cheap while no
    // baggage was ever set.
    has_baggage: AtomicBool,
    origin: Option<String>,

    span_links: Vec<SpanLink>,
    // When set, this context only propagates baggage items and must not
    // contribute distributed-tracing fields to descendants.
    baggage_only: bool,

    hooks: Arc<TracerHooks>,
}

/// Capabilities of an externally-typed span context that can be adopted
/// into a [`SpanContext`].
pub trait ForeignSpanContext {
    /// The full 128-bit trace identifier, big-endian.
    fn trace_id_bytes(&self) -> [u8; 16];
    /// The 64-bit span identifier.
    fn span_id(&self) -> u64;
    /// Visit each baggage item; iteration stops when `f` returns `false`.
    fn for_each_baggage_item(&self, f: &mut dyn FnMut(&str, &str) -> bool);
}

/// Extended adoption capabilities: sources that additionally expose their
/// trace-affecting state get it copied into a freshly created trace
/// buffer.
pub trait ForeignSpanContextExt: ForeignSpanContext {
    /// The sampling decision made for the source trace.
    fn sampling_decision(&self) -> SamplingDecision;
    /// The origin of the source trace, e.g. "synthetics".
    fn origin(&self) -> Option<String>;
    /// The numeric sampling priority, if one was set.
    fn priority(&self) -> Option<f64>;
    /// Trace-level tags of the source trace.
    fn trace_tags(&self) -> HashMap<String, String>;
    /// Trace-level tags propagating across service boundaries.
    fn propagating_tags(&self) -> HashMap<String, String>;
}

impl SpanContext {
    /// Create the context serving the given span. When a parent is given,
    /// the new context inherits the trace, baggage and other values from
    /// it. The span is pushed into the context's trace as part of
    /// construction, so this must be called exactly once per span.
    pub(crate) fn new(
        span: &Arc<Span>,
        parent: Option<&SpanContext>,
        hooks: &Arc<TracerHooks>,
    ) -> SpanContext {
        let mut context = SpanContext {
            updated: false,
            trace: None,
            span: Some(Arc::clone(span)),
            errors: AtomicI32::new(0),
            reparent_id: None,
            is_remote: false,
            trace_id: TraceId::default(),
            span_id: span.span_id(),
            baggage: RwLock::new(HashMap::new()),
            has_baggage: AtomicBool::new(false),
            origin: None,
            span_links: Vec::new(),
            baggage_only: false,
            hooks: Arc::clone(hooks),
        };

        context.trace_id.set_lower(span.trace_id_lower());
        if let Some(parent) = parent {
            if !parent.baggage_only {
                context.trace_id.set_upper(parent.trace_id.upper());
                context.trace.clone_from(&parent.trace);
                context.origin.clone_from(&parent.origin);
                context
                    .errors
                    .store(parent.errors.load(Ordering::Relaxed), Ordering::Relaxed);
            }
            parent.for_each_baggage_item(|k, v| {
                context.set_baggage_item(k, v);
                true
            });
        } else if hooks.config.tracer_config().trace_128_bit_id_enabled {
            // 128-bit identifier, formatted big-endian as
            // <32-bit unix seconds> <32 bits of zero> <64 random bits>.
            // The start time is non-negative and its seconds fit within
            // 32 bits for the foreseeable future.
            let seconds = (span.start() / 1_000_000_000) as u32;
            context.trace_id.set_upper(u64::from(seconds) << 32);
        }
        let trace = context
            .trace
            .get_or_insert_with(|| Arc::new(TraceBuffer::new(Arc::clone(hooks))));
        // The first span of the trace can safely be assumed to be the root.
        trace.set_root_if_unset(span);
        span.set_trace_id_upper(context.trace_id.upper());
        trace.push(span);
        context.updated = false;
        context
    }

    /// Adopt an externally-typed span context, copying its identifiers and
    /// all baggage. The result can be used to start child spans.
    pub fn from_foreign<C>(c: &C, hooks: &Arc<TracerHooks>) -> SpanContext
    where
        C: ForeignSpanContext + ?Sized,
    {
        let context = SpanContext {
            updated: false,
            trace: None,
            span: None,
            errors: AtomicI32::new(0),
            reparent_id: None,
            is_remote: false,
            trace_id: TraceId::from_bytes(c.trace_id_bytes()),
            span_id: c.span_id(),
            baggage: RwLock::new(HashMap::new()),
            has_baggage: AtomicBool::new(false),
            origin: None,
            span_links: Vec::new(),
            baggage_only: false,
            hooks: Arc::clone(hooks),
        };
        c.for_each_baggage_item(&mut |k, v| {
            context.set_baggage_item(k, v);
            true
        });
        context
    }

    /// Adopt an externally-typed span context that also exposes its
    /// trace-affecting state, copying priority, decision, origin and
    /// trace-level tags into a freshly created trace buffer.
    pub fn from_foreign_ext<C>(c: &C, hooks: &Arc<TracerHooks>) -> SpanContext
    where
        C: ForeignSpanContextExt + ?Sized,
    {
        let mut context = SpanContext::from_foreign(c, hooks);
        context.origin = c.origin();
        let trace = TraceBuffer::new(Arc::clone(hooks));
        trace.adopt_propagated_state(
            c.priority(),
            c.sampling_decision(),
            c.trace_tags(),
            c.propagating_tags(),
        );
        context.trace = Some(Arc::new(trace));
        context
    }

    /// Create a context that carries only baggage across boundaries and
    /// contributes no distributed-tracing fields to descendants.
    pub fn baggage_only<I, K, V>(items: I, hooks: &Arc<TracerHooks>) -> SpanContext
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let context = SpanContext {
            updated: false,
            trace: None,
            span: None,
            errors: AtomicI32::new(0),
            reparent_id: None,
            is_remote: false,
            trace_id: TraceId::default(),
            span_id: 0,
            baggage: RwLock::new(HashMap::new()),
            has_baggage: AtomicBool::new(false),
            origin: None,
            span_links: Vec::new(),
            baggage_only: true,
            hooks: Arc::clone(hooks),
        };
        for (k, v) in items {
            context.set_baggage_item(k.into(), v.into());
        }
        context
    }

    /// The 64-bit identifier of the span this context belongs to.
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// The full 128-bit trace identifier.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The trace identifier as 32 lowercase hex characters.
    pub fn trace_id_hex(&self) -> String {
        self.trace_id.hex_encoded()
    }

    /// The origin this trace was produced by, e.g. "synthetics".
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Override the trace origin.
    pub fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = Some(origin.into());
    }

    /// Whether this context was extracted from a remote carrier.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Mark this context as extracted from a remote carrier.
    pub fn set_remote(&mut self, remote: bool) {
        self.is_remote = remote;
    }

    /// Whether this context only propagates baggage items.
    pub fn is_baggage_only(&self) -> bool {
        self.baggage_only
    }

    /// The identifier used by the backend to reparent spans whose direct
    /// parent was never submitted, if one was extracted.
    pub fn reparent_id(&self) -> Option<&str> {
        self.reparent_id.as_deref()
    }

    /// Record the reparenting identifier extracted from a carrier.
    pub fn set_reparent_id(&mut self, id: impl Into<String>) {
        self.reparent_id = Some(id.into());
    }

    /// Whether propagation-relevant state changed after this context was
    /// initialized, requiring cross-process metadata to be refreshed.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Number of spans with errors recorded for this trace so far.
    pub fn error_count(&self) -> i32 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Count one more span with errors for this trace.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// The links attached to this context, as a defensive copy.
    pub fn span_links(&self) -> Vec<SpanLink> {
        self.span_links.clone()
    }

    /// Attach a link to a span in a separate trace.
    pub fn add_span_link(&mut self, link: SpanLink) {
        self.span_links.push(link);
    }

    /// Set the baggage item `key` to `value`.
    pub fn set_baggage_item(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut baggage) = self.baggage.write() {
            self.has_baggage.store(true, Ordering::Release);
            baggage.insert(key.into(), value.into());
        }
    }

    /// The value of the baggage item `key`, if present.
    pub fn baggage_item(&self, key: &str) -> Option<String> {
        if !self.has_baggage.load(Ordering::Acquire) {
            return None;
        }
        self.baggage
            .read()
            .ok()
            .and_then(|baggage| baggage.get(key).cloned())
    }

    /// Visit each baggage item; iteration stops when `f` returns `false`.
    pub fn for_each_baggage_item(&self, mut f: impl FnMut(&str, &str) -> bool) {
        if !self.has_baggage.load(Ordering::Acquire) {
            return;
        }
        if let Ok(baggage) = self.baggage.read() {
            for (k, v) in baggage.iter() {
                if !f(k, v) {
                    break;
                }
            }
        }
    }

    /// The trace's sampling priority, or `None` when none has been set.
    pub fn sampling_priority(&self) -> Option<i32> {
        self.trace.as_ref().and_then(|trace| trace.sampling_priority())
    }

    /// The trace's current sampling decision.
    pub fn sampling_decision(&self) -> SamplingDecision {
        self.trace
            .as_ref()
            .map(|trace| trace.decision())
            .unwrap_or_default()
    }

    /// Set the sampling priority and the decision maker derived from
    /// `sampler` on the owning trace.
    pub fn set_sampling_priority(&mut self, priority: i32, sampler: SamplerName) {
        let trace = self
            .trace
            .get_or_insert_with(|| Arc::new(TraceBuffer::new(Arc::clone(&self.hooks))));
        if trace.set_sampling_priority(priority, sampler) {
            // Priority or sampler changed: cross-process propagation
            // metadata must be refreshed.
            self.updated = true;
        }
    }

    /// Finalize the owning trace as kept; the first decision wins.
    pub fn keep(&self) {
        if let Some(trace) = &self.trace {
            trace.keep();
        }
    }

    /// Finalize the owning trace as dropped; the first decision wins.
    pub fn drop(&self) {
        if let Some(trace) = &self.trace {
            TraceBuffer::drop(trace);
        }
    }

    /// Mark the owning span as finished in the trace.
    pub(crate) fn finish(&self) {
        if let (Some(trace), Some(span)) = (&self.trace, &self.span) {
            trace.finished_one(span);
        }
    }
}

/// Absent-safe read access to an optional [`SpanContext`].
///
/// Callers holding an `Option<&SpanContext>` can read identifiers,
/// priority and baggage without null-checking first: every accessor on an
/// absent context yields the documented zero value or empty sentinel.
pub trait OptionSpanContextExt {
    /// The span identifier, or `0` for an absent context.
    fn span_id(&self) -> u64;
    /// The trace identifier, or [`TraceId::EMPTY`] for an absent context.
    fn trace_id(&self) -> TraceId;
    /// The hex trace identifier, or [`TRACE_ID_ZERO`] for an absent
    /// context.
    fn trace_id_hex(&self) -> String;
    /// The sampling priority, or `None` for an absent context.
    fn sampling_priority(&self) -> Option<i32>;
    /// Visit baggage items; a no-op for an absent context.
    fn for_each_baggage_item(&self, f: &mut dyn FnMut(&str, &str) -> bool);
}

impl OptionSpanContextExt for Option<&SpanContext> {
    fn span_id(&self) -> u64 {
        self.map(SpanContext::span_id).unwrap_or(0)
    }

    fn trace_id(&self) -> TraceId {
        self.map(SpanContext::trace_id).unwrap_or(TraceId::EMPTY)
    }

    fn trace_id_hex(&self) -> String {
        self.map(SpanContext::trace_id_hex)
            .unwrap_or_else(|| TRACE_ID_ZERO.to_string())
    }

    fn sampling_priority(&self) -> Option<i32> {
        self.and_then(SpanContext::sampling_priority)
    }

    fn for_each_baggage_item(&self, f: &mut dyn FnMut(&str, &str) -> bool) {
        if let Some(context) = self {
            context.for_each_baggage_item(f);
        }
    }
}
