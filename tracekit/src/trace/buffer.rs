//! # Trace buffer
//!
//! The object shared by every span context belonging to one trace. It owns
//! the buffered span collection, the sampling priority and decision, the
//! trace-level tag maps and the finish protocol that turns independently
//! finishing spans into flush-ready [`Chunk`]s.
//!
//! A single read/write lock guards the span collection, the tag maps, the
//! priority and the `locked`/`full` flags; every buffer mutation is
//! serialized through it and is one atomic step from an external
//! observer's perspective. The tri-state sampling decision deliberately
//! lives outside that lock as a compare-and-set atomic so its value stays
//! legible without blocking on unrelated buffer contention.

use crate::tk_debug;
use crate::tk_error;
use crate::trace::peer_service;
use crate::trace::tags;
use crate::trace::tracer::TracerHooks;
use crate::trace::{Chunk, SamplerName, SamplingDecision, Span, Stat};
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

/// Maximum number of spans kept in memory for a single trace. When more
/// spans than this are pushed, the whole trace is abandoned and its spans
/// discarded; a partial trace is considered worse than no trace.
pub const DEFAULT_MAX_SPANS_PER_TRACE: usize = 100_000;

// Initial buffer capacity; spans are much bigger than the slots holding
// them, so pre-allocating a handful avoids early regrowth.
const TRACE_START_CAPACITY: usize = 10;

/// Shared state of one trace: the buffered spans, sampling priority and
/// decision, trace-level tags and the finish/flush protocol.
///
/// A buffer is created when the first span of a trace starts, or when a
/// remote context carrying trace-affecting fields is adopted. It is shared
/// by all span contexts of the trace and becomes eligible for reclamation
/// once its span collection empties after a full flush or a capacity
/// eviction.
#[derive(Debug)]
pub struct TraceBuffer {
    inner: RwLock<BufferInner>,
    // Lock-free so layers racing to finalize a trace's fate never block.
    decision: AtomicU32,
    max_spans: usize,
    hooks: Arc<TracerHooks>,
}

#[derive(Debug)]
struct BufferInner {
    spans: Vec<Arc<Span>>,
    tags: HashMap<String, String>,
    propagating_tags: HashMap<String, String>,
    finished: usize,
    full: bool,
    priority: Option<f64>,
    locked: bool,
    // The root of the trace, if known; `None` until the first span is
    // pushed, e.g. for a buffer created by adopting a remote context.
    root: Option<Arc<Span>>,
}

impl TraceBuffer {
    /// Create an empty buffer wired to the given collaborators.
    pub fn new(hooks: Arc<TracerHooks>) -> Self {
        TraceBuffer::with_max_spans(hooks, DEFAULT_MAX_SPANS_PER_TRACE)
    }

    /// Create an empty buffer holding at most `max_spans` spans before the
    /// trace is abandoned.
    pub fn with_max_spans(hooks: Arc<TracerHooks>, max_spans: usize) -> Self {
        TraceBuffer {
            inner: RwLock::new(BufferInner {
                spans: Vec::with_capacity(TRACE_START_CAPACITY),
                tags: HashMap::new(),
                propagating_tags: HashMap::new(),
                finished: 0,
                full: false,
                priority: None,
                locked: false,
                root: None,
            }),
            decision: AtomicU32::new(SamplingDecision::Undecided.as_u32()),
            max_spans,
            hooks,
        }
    }

    /// The trace's sampling priority, or `None` when no priority has been
    /// set.
    pub fn sampling_priority(&self) -> Option<i32> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.priority.map(|p| p as i32))
    }

    /// Whether the buffer reached capacity and abandoned its trace.
    pub fn is_full(&self) -> bool {
        self.inner.read().map(|inner| inner.full).unwrap_or(false)
    }

    /// The current sampling decision.
    pub fn decision(&self) -> SamplingDecision {
        SamplingDecision::from_u32(self.decision.load(Ordering::Acquire))
    }

    /// Finalize the trace as kept. The first decision wins: once the trace
    /// is decided, later calls are no-ops.
    pub fn keep(&self) {
        let _ = self.decision.compare_exchange(
            SamplingDecision::Undecided.as_u32(),
            SamplingDecision::Keep.as_u32(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Finalize the trace as dropped. The first decision wins: once the
    /// trace is decided, later calls are no-ops.
    pub fn drop(&self) {
        let _ = self.decision.compare_exchange(
            SamplingDecision::Undecided.as_u32(),
            SamplingDecision::Drop.as_u32(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Set a trace-level tag, attached to the first span of every flushed
    /// chunk.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.tags.insert(key.into(), value.into());
        }
    }

    /// Set a trace-level tag that additionally propagates across service
    /// boundaries.
    pub fn set_propagating_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.propagating_tags.insert(key.into(), value.into());
        }
    }

    /// The value of the propagating tag `key`, if present.
    pub fn propagating_tag(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.propagating_tags.get(key).cloned())
    }

    /// Set the sampling priority and the decision maker, returning `true`
    /// if anything observable by cross-process propagation changed.
    ///
    /// No-op returning `false` once the buffer is locked (the root span
    /// finished with a frozen priority). A strictly positive priority from
    /// a known sampler installs the decision-maker propagating tag; a
    /// decision-maker change reports "updated" and takes precedence over
    /// the raw priority-changed signal. A non-positive priority removes
    /// the decision maker: sampled-out traces don't carry one.
    pub(crate) fn set_sampling_priority(&self, priority: i32, sampler: SamplerName) -> bool {
        match self.inner.write() {
            Ok(mut inner) => Self::set_sampling_priority_locked(&mut inner, priority, sampler),
            Err(_) => false,
        }
    }

    fn set_sampling_priority_locked(
        inner: &mut BufferInner,
        priority: i32,
        sampler: SamplerName,
    ) -> bool {
        if inner.locked {
            return false;
        }

        let updated_priority = inner.priority != Some(f64::from(priority));
        inner.priority = Some(f64::from(priority));

        let current_dm = inner.propagating_tags.get(tags::KEY_DECISION_MAKER).cloned();
        if priority > 0 && sampler != SamplerName::Unknown {
            // Send no decision maker when the mechanism is unknown. A global
            // rate applied first and a rule sampler applied afterwards can
            // produce the same priority with a different decision maker, so
            // the decision makers are compared as well.
            let dm = sampler.decision_maker_value();
            let updated_dm = current_dm.as_deref() != Some(dm.as_str());
            if updated_dm {
                inner
                    .propagating_tags
                    .insert(tags::KEY_DECISION_MAKER.to_string(), dm);
                return true;
            }
        }
        if priority <= 0 && current_dm.is_some() {
            inner.propagating_tags.remove(tags::KEY_DECISION_MAKER);
        }

        updated_priority
    }

    /// Record `span` as the trace root if no root is known yet. The first
    /// span of a trace can safely be assumed to be its root.
    pub(crate) fn set_root_if_unset(&self, span: &Arc<Span>) {
        if let Ok(mut inner) = self.inner.write() {
            if inner.root.is_none() {
                inner.root = Some(Arc::clone(span));
            }
        }
    }

    /// Push a new span into the trace.
    ///
    /// Once the buffer is full the push is silently discarded: an
    /// abandoned trace renders all further spans inert. Reaching capacity
    /// abandons the whole trace, releasing every buffered span.
    pub(crate) fn push(&self, span: &Arc<Span>) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if inner.full {
            return;
        }
        if inner.spans.len() >= self.max_spans {
            inner.full = true;
            inner.spans = Vec::new();
            tk_error!(name: "trace_buffer_full", max_spans = self.max_spans);
            self.hooks.stats.record(Stat::TracesDropped(1));
            return;
        }
        if let Some(priority) = span.metric(tags::KEY_SAMPLING_PRIORITY) {
            // The caller pre-decided the priority; adopt it without a known
            // sampling mechanism.
            Self::set_sampling_priority_locked(&mut inner, priority as i32, SamplerName::Unknown);
        }
        inner.spans.push(Arc::clone(span));
        self.hooks.stats.record(Stat::SpansStarted(1));
    }

    /// Acknowledge that `span` has finished and, depending on the state of
    /// the trace, flush fully, flush partially, or keep accumulating.
    pub(crate) fn finished_one(&self, span: &Arc<Span>) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        let inner = &mut *inner;
        span.mark_finished();
        if inner.full {
            // Capacity was reached and the buffer no longer tracks every
            // span of the trace; the completion conditions below would
            // fire prematurely against a non-authoritative membership.
            return;
        }
        inner.finished += 1;

        let config = self.hooks.config.tracer_config();
        peer_service::set_peer_service(
            span,
            config.peer_service_defaults,
            &config.peer_service_mappings,
        );
        let service = span.service();
        if !service.is_empty() && !service.eq_ignore_ascii_case(&config.service) {
            span.set_tag(tags::KEY_BASE_SERVICE, config.service.clone());
        }

        let is_root = inner.root.as_ref().is_some_and(|root| Arc::ptr_eq(root, span));
        if is_root {
            if let Some(priority) = inner.priority {
                // After the root has finished the priority is locked down:
                // the root span may be read for serialization at any point
                // and must not mutate.
                span.set_metric(tags::KEY_SAMPLING_PRIORITY, priority);
                inner.locked = true;
            }
        }
        let was_first = inner
            .spans
            .first()
            .is_some_and(|first| Arc::ptr_eq(first, span));
        if was_first {
            // Only the first span of a flushed chunk carries the
            // trace-level tags; repeating them on every span would bloat
            // the submitted payload.
            self.set_trace_tags(&*inner, span);
        }

        if let Some(observer) = &self.hooks.observer {
            observer.on_finish(span);
        }

        if inner.finished == inner.spans.len() {
            let spans = mem::take(&mut inner.spans);
            let will_send = self.decision() == SamplingDecision::Keep;
            self.hooks.sink.submit(Chunk::new(spans, will_send));
            // The buffer can be reused for several flushes.
            inner.finished = 0;
            return;
        }

        if !config.partial_flush_enabled || inner.finished < config.partial_flush_min_spans {
            return;
        }

        tk_debug!(name: "partial_flush_triggered", finished_spans = inner.finished);
        let mut finished_spans = Vec::with_capacity(inner.finished);
        let mut leftover_spans = Vec::with_capacity(inner.spans.len() - inner.finished);
        for s in inner.spans.drain(..) {
            if s.is_finished() {
                finished_spans.push(s);
            } else {
                leftover_spans.push(s);
            }
        }
        self.hooks.stats.record(Stat::PartialFlush {
            closed: finished_spans.len(),
            remaining: leftover_spans.len(),
        });
        if finished_spans.is_empty() {
            inner.spans = leftover_spans;
            inner.finished = 0;
            return;
        }
        if let Some(priority) = inner.priority {
            finished_spans[0].set_metric(tags::KEY_SAMPLING_PRIORITY, priority);
        }
        if !was_first {
            // Every flushed chunk's first span carries the trace-level
            // tags, wherever the just-finished span sat in the buffer.
            self.set_trace_tags(&*inner, &finished_spans[0]);
        }
        let will_send = self.decision() == SamplingDecision::Keep;
        self.hooks
            .sink
            .submit(Chunk::new(finished_spans, will_send));
        inner.spans = leftover_spans;
        inner.finished = 0;
    }

    /// Attach all trace-level tags to `span`.
    fn set_trace_tags(&self, inner: &BufferInner, span: &Arc<Span>) {
        for (k, v) in &inner.tags {
            span.set_tag(k.clone(), v.clone());
        }
        for (k, v) in &inner.propagating_tags {
            span.set_tag(k.clone(), v.clone());
        }
        for (k, v) in self.hooks.metadata.git_metadata_tags() {
            span.set_tag(k, v);
        }
        let upper = span.trace_id_upper();
        if upper != 0 {
            span.set_tag(tags::KEY_TRACE_ID_128, format!("{upper:016x}"));
        }
        if let Some(process_tags) = self.hooks.metadata.process_tags() {
            if !process_tags.is_empty() {
                span.set_tag(tags::KEY_PROCESS_TAGS, process_tags);
            }
        }
    }

    /// Seed the buffer with state extracted from a remote context.
    pub(crate) fn adopt_propagated_state(
        &self,
        priority: Option<f64>,
        decision: SamplingDecision,
        tags: HashMap<String, String>,
        propagating_tags: HashMap<String, String>,
    ) {
        if let Ok(mut inner) = self.inner.write() {
            inner.priority = priority;
            inner.tags = tags;
            inner.propagating_tags = propagating_tags;
        }
        self.decision.store(decision.as_u32(), Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn buffered_span_count(&self) -> usize {
        self.inner.read().map(|inner| inner.spans.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn lock_priority(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.locked = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        FixedConfig, InMemoryChunkSink, NoMetadata, RecordingStatsSink, TracerConfig,
    };

    fn test_hooks() -> (Arc<TracerHooks>, InMemoryChunkSink, RecordingStatsSink) {
        let sink = InMemoryChunkSink::new();
        let stats = RecordingStatsSink::new();
        let hooks = TracerHooks::new(
            Arc::new(sink.clone()),
            Arc::new(FixedConfig(TracerConfig {
                service: "test-service".to_string(),
                trace_128_bit_id_enabled: true,
                partial_flush_enabled: false,
                partial_flush_min_spans: 2,
                peer_service_defaults: false,
                peer_service_mappings: HashMap::new(),
            })),
            Arc::new(stats.clone()),
            Arc::new(NoMetadata),
        );
        (Arc::new(hooks), sink, stats)
    }

    fn test_span(id: u64) -> Arc<Span> {
        Arc::new(Span::new("op", "test-service", "res", id, 1, 0, 0))
    }

    #[test]
    fn capacity_overflow_abandons_whole_trace() {
        let (hooks, sink, stats) = test_hooks();
        let buffer = TraceBuffer::with_max_spans(hooks, 3);
        let spans: Vec<_> = (1..=4).map(test_span).collect();
        for span in &spans[..3] {
            buffer.push(span);
        }
        assert!(!buffer.is_full());
        assert_eq!(buffer.buffered_span_count(), 3);

        buffer.push(&spans[3]);
        assert!(buffer.is_full());
        assert_eq!(buffer.buffered_span_count(), 0);
        assert_eq!(stats.traces_dropped(), 1);

        // Pushes and finishes are inert from now on; no chunk is emitted.
        buffer.push(&test_span(5));
        for span in &spans {
            buffer.finished_one(span);
        }
        assert!(sink.get_submitted_chunks().is_empty());
        assert_eq!(buffer.buffered_span_count(), 0);
    }

    #[test]
    fn decision_first_writer_wins() {
        let (hooks, _sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        assert_eq!(buffer.decision(), SamplingDecision::Undecided);
        buffer.keep();
        assert_eq!(buffer.decision(), SamplingDecision::Keep);
        buffer.drop();
        buffer.keep();
        assert_eq!(buffer.decision(), SamplingDecision::Keep);
    }

    #[test]
    fn priority_is_immutable_once_locked() {
        let (hooks, _sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        assert!(buffer.set_sampling_priority(2, SamplerName::Manual));
        buffer.lock_priority();
        assert!(!buffer.set_sampling_priority(-1, SamplerName::Manual));
        assert_eq!(buffer.sampling_priority(), Some(2));
    }

    #[test]
    fn decision_maker_tag_lifecycle() {
        let (hooks, _sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);

        // Positive priority from a known sampler installs the tag.
        assert!(buffer.set_sampling_priority(2, SamplerName::Manual));
        assert_eq!(
            buffer.propagating_tag(tags::KEY_DECISION_MAKER).as_deref(),
            Some("-4")
        );

        // Same priority, same sampler: nothing changed.
        assert!(!buffer.set_sampling_priority(2, SamplerName::Manual));

        // Same priority but a different mechanism still reports updated.
        assert!(buffer.set_sampling_priority(2, SamplerName::RuleRate));
        assert_eq!(
            buffer.propagating_tag(tags::KEY_DECISION_MAKER).as_deref(),
            Some("-3")
        );

        // Sampled-out traces do not carry a decision maker.
        assert!(buffer.set_sampling_priority(0, SamplerName::Manual));
        assert_eq!(buffer.propagating_tag(tags::KEY_DECISION_MAKER), None);
    }

    #[test]
    fn unknown_sampler_sets_priority_without_decision_maker() {
        let (hooks, _sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        assert!(buffer.set_sampling_priority(1, SamplerName::Unknown));
        assert_eq!(buffer.sampling_priority(), Some(1));
        assert_eq!(buffer.propagating_tag(tags::KEY_DECISION_MAKER), None);
    }

    #[test]
    fn push_adopts_pre_set_priority_metric() {
        let (hooks, _sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        let span = test_span(1);
        span.set_metric(tags::KEY_SAMPLING_PRIORITY, 2.0);
        buffer.push(&span);
        assert_eq!(buffer.sampling_priority(), Some(2));
        assert_eq!(buffer.propagating_tag(tags::KEY_DECISION_MAKER), None);
    }

    #[test]
    fn full_flush_emits_single_chunk_with_all_spans() {
        let (hooks, sink, stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        let spans: Vec<_> = (1..=3).map(test_span).collect();
        buffer.set_root_if_unset(&spans[0]);
        for span in &spans {
            buffer.push(span);
        }
        assert_eq!(stats.spans_started(), 3);

        buffer.finished_one(&spans[2]);
        buffer.finished_one(&spans[1]);
        assert!(sink.get_submitted_chunks().is_empty());

        buffer.finished_one(&spans[0]);
        let chunks = sink.get_submitted_chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].spans().len(), 3);
        assert_eq!(buffer.buffered_span_count(), 0);
    }

    #[test]
    fn will_send_reflects_decision_at_flush_time() {
        let (hooks, sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        let span = test_span(1);
        buffer.set_root_if_unset(&span);
        buffer.push(&span);
        buffer.keep();
        buffer.finished_one(&span);
        let chunks = sink.get_submitted_chunks();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].will_send());
    }

    #[test]
    fn undecided_trace_chunk_is_not_sent() {
        let (hooks, sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        let span = test_span(1);
        buffer.set_root_if_unset(&span);
        buffer.push(&span);
        buffer.finished_one(&span);
        assert!(!sink.get_submitted_chunks()[0].will_send());
    }

    #[derive(Debug)]
    struct BuildMetadata;

    impl crate::trace::MetadataProvider for BuildMetadata {
        fn git_metadata_tags(&self) -> Vec<(String, String)> {
            vec![("_dd.git.commit.sha".to_string(), "abc123".to_string())]
        }

        fn process_tags(&self) -> Option<String> {
            Some("entrypoint:app".to_string())
        }
    }

    #[test]
    fn first_span_of_chunk_carries_trace_level_tags() {
        let sink = InMemoryChunkSink::new();
        let hooks = Arc::new(TracerHooks::new(
            Arc::new(sink.clone()),
            Arc::new(FixedConfig(TracerConfig::default())),
            Arc::new(RecordingStatsSink::new()),
            Arc::new(BuildMetadata),
        ));
        let buffer = TraceBuffer::new(hooks);
        let first = test_span(1);
        let second = test_span(2);
        first.set_trace_id_upper(0x6869_0000_0000_0000);
        buffer.set_root_if_unset(&first);
        buffer.push(&first);
        buffer.push(&second);
        buffer.set_tag("env", "prod");
        buffer.set_propagating_tag("_dd.p.usr", "abc");

        buffer.finished_one(&first);
        buffer.finished_one(&second);

        assert_eq!(sink.get_submitted_chunks().len(), 1);
        assert_eq!(first.tag("env").as_deref(), Some("prod"));
        assert_eq!(first.tag("_dd.p.usr").as_deref(), Some("abc"));
        assert_eq!(first.tag("_dd.git.commit.sha").as_deref(), Some("abc123"));
        assert_eq!(
            first.tag(tags::KEY_PROCESS_TAGS).as_deref(),
            Some("entrypoint:app")
        );
        assert_eq!(
            first.tag(tags::KEY_TRACE_ID_128).as_deref(),
            Some("6869000000000000")
        );
        // Trace-level tags go on the first span only.
        assert_eq!(second.tag("env"), None);
    }

    #[test]
    fn root_finish_freezes_priority_metric() {
        let (hooks, sink, _stats) = test_hooks();
        let buffer = TraceBuffer::new(hooks);
        let root = test_span(1);
        buffer.set_root_if_unset(&root);
        buffer.push(&root);
        buffer.set_sampling_priority(1, SamplerName::AgentRate);
        buffer.finished_one(&root);

        assert_eq!(root.metric(tags::KEY_SAMPLING_PRIORITY), Some(1.0));
        // Locked from here on.
        assert!(!buffer.set_sampling_priority(2, SamplerName::Manual));
        assert_eq!(sink.get_submitted_chunks().len(), 1);
    }
}
