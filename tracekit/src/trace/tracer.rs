//! # Tracer
//!
//! The tracer is the front-end of the trace core: it bundles the injected
//! collaborators, generates identifiers, starts spans and exposes the
//! finish protocol on the returned span handles.
//!
//! All collaborators are supplied at construction time through
//! [`TracerBuilder`]; the buffer and finish protocol never resolve
//! process-wide state at call time, which also keeps them testable with
//! in-memory fakes.

use crate::trace::span_context::{ForeignSpanContext, ForeignSpanContextExt};
use crate::trace::tags;
use crate::trace::{
    Chunk, ChunkSink, ConfigProvider, FixedConfig, MetadataProvider, NoMetadata, NoopStatsSink,
    SamplerName, Span, SpanContext, StatsSink, TracerConfig, PRIORITY_USER_KEEP,
    PRIORITY_USER_REJECT,
};
use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Observer notified as each individual span finishes, decoupled from
/// chunk completion. Mock tracers use this to track spans one by one.
///
/// The observer runs with the trace buffer's guard held and must not call
/// back into the trace core.
pub trait SpanObserver: Send + Sync + fmt::Debug {
    /// Called for every span right after it is marked finished.
    fn on_finish(&self, span: &Arc<Span>);
}

/// The collaborators consumed by the trace core, injected once at tracer
/// construction time.
#[derive(Clone, Debug)]
pub struct TracerHooks {
    pub(crate) sink: Arc<dyn ChunkSink>,
    pub(crate) config: Arc<dyn ConfigProvider>,
    pub(crate) stats: Arc<dyn StatsSink>,
    pub(crate) metadata: Arc<dyn MetadataProvider>,
    pub(crate) observer: Option<Arc<dyn SpanObserver>>,
}

impl TracerHooks {
    /// Bundle the given collaborators.
    pub fn new(
        sink: Arc<dyn ChunkSink>,
        config: Arc<dyn ConfigProvider>,
        stats: Arc<dyn StatsSink>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        TracerHooks {
            sink,
            config,
            stats,
            metadata,
            observer: None,
        }
    }

    /// Attach a per-span finish observer.
    pub fn with_observer(mut self, observer: Arc<dyn SpanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A sink discarding every chunk, used when no sink is configured.
#[derive(Debug)]
struct NoopSink;

impl ChunkSink for NoopSink {
    fn submit(&self, _chunk: Chunk) {}
}

/// Starts spans and owns the collaborators shared by every trace they
/// belong to.
#[derive(Clone, Debug)]
pub struct Tracer {
    hooks: Arc<TracerHooks>,
}

impl Tracer {
    /// Start configuring a new tracer.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// The collaborator bundle this tracer was built with.
    pub fn hooks(&self) -> &Arc<TracerHooks> {
        &self.hooks
    }

    /// Start configuring a new root span with the given operation name.
    pub fn span_builder(&self, name: impl Into<String>) -> SpanBuilder<'_> {
        SpanBuilder {
            tracer: self,
            name: name.into(),
            service: None,
            resource: None,
            kind: None,
            tags: Vec::new(),
            parent: None,
            start_time: None,
        }
    }

    /// Start a root span with the given operation name.
    pub fn start(&self, name: impl Into<String>) -> SpanHandle {
        self.span_builder(name).start()
    }

    /// Adopt an externally-typed span context, which can then be used as
    /// the parent of new spans.
    pub fn adopt<C>(&self, context: &C) -> SpanContext
    where
        C: ForeignSpanContext + ?Sized,
    {
        SpanContext::from_foreign(context, &self.hooks)
    }

    /// Adopt an externally-typed span context together with its
    /// trace-affecting state.
    pub fn adopt_ext<C>(&self, context: &C) -> SpanContext
    where
        C: ForeignSpanContextExt + ?Sized,
    {
        SpanContext::from_foreign_ext(context, &self.hooks)
    }
}

/// Configures and builds a [`Tracer`].
#[derive(Debug, Default)]
pub struct TracerBuilder {
    sink: Option<Arc<dyn ChunkSink>>,
    config: Option<Arc<dyn ConfigProvider>>,
    stats: Option<Arc<dyn StatsSink>>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    observer: Option<Arc<dyn SpanObserver>>,
}

impl TracerBuilder {
    /// The sink receiving flushed chunks.
    pub fn with_sink<S: ChunkSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Fixed tracer settings; shorthand for a [`FixedConfig`] provider.
    pub fn with_config(mut self, config: TracerConfig) -> Self {
        self.config = Some(Arc::new(FixedConfig(config)));
        self
    }

    /// The live configuration provider sampled on each finish event.
    pub fn with_config_provider<C: ConfigProvider + 'static>(mut self, provider: C) -> Self {
        self.config = Some(Arc::new(provider));
        self
    }

    /// The telemetry counter sink.
    pub fn with_stats<S: StatsSink + 'static>(mut self, stats: S) -> Self {
        self.stats = Some(Arc::new(stats));
        self
    }

    /// The process-wide metadata provider queried at flush time.
    pub fn with_metadata<M: MetadataProvider + 'static>(mut self, metadata: M) -> Self {
        self.metadata = Some(Arc::new(metadata));
        self
    }

    /// An observer notified of every individual span finish.
    pub fn with_observer<O: SpanObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Build the tracer. Unset collaborators default to discarding
    /// implementations; unset configuration is read from the environment.
    pub fn build(self) -> Tracer {
        let hooks = TracerHooks {
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopSink)),
            config: self
                .config
                .unwrap_or_else(|| Arc::new(FixedConfig(TracerConfig::default()))),
            stats: self.stats.unwrap_or_else(|| Arc::new(NoopStatsSink)),
            metadata: self.metadata.unwrap_or_else(|| Arc::new(NoMetadata)),
            observer: self.observer,
        };
        Tracer {
            hooks: Arc::new(hooks),
        }
    }
}

/// Configures a span before it is started.
#[derive(Debug)]
pub struct SpanBuilder<'a> {
    tracer: &'a Tracer,
    name: String,
    service: Option<String>,
    resource: Option<String>,
    kind: Option<String>,
    tags: Vec<(String, String)>,
    parent: Option<&'a SpanContext>,
    start_time: Option<SystemTime>,
}

impl<'a> SpanBuilder<'a> {
    /// The service this span belongs to; defaults to the configured
    /// service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// The resource this span operates on; defaults to the operation name.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// The span kind, e.g. "client" or "producer".
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// A tag set on the span at start time.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// The parent context the new span descends from.
    pub fn child_of(mut self, parent: &'a SpanContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// An explicit start time; defaults to now.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Start the span, registering it with its trace.
    pub fn start(self) -> SpanHandle {
        let hooks = &self.tracer.hooks;
        let span_id = random_id();
        let linked_parent = self.parent.filter(|parent| !parent.is_baggage_only());
        let trace_id_lower = linked_parent
            .map(|parent| parent.trace_id().lower())
            .filter(|&lower| lower != 0)
            .unwrap_or(span_id);
        let parent_id = linked_parent.map(|parent| parent.span_id()).unwrap_or(0);
        let start = self
            .start_time
            .unwrap_or_else(SystemTime::now)
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as i64)
            .unwrap_or(0);
        let service = self
            .service
            .unwrap_or_else(|| hooks.config.tracer_config().service.clone());
        let resource = self.resource.unwrap_or_else(|| self.name.clone());
        let span = Arc::new(Span::new(
            self.name,
            service,
            resource,
            span_id,
            trace_id_lower,
            parent_id,
            start,
        ));
        if let Some(kind) = self.kind {
            span.set_tag(tags::SPAN_KIND, kind);
        }
        let context = SpanContext::new(&span, self.parent, hooks);
        let mut handle = SpanHandle { span, context };
        for (key, value) in self.tags {
            handle.set_tag(&key, value);
        }
        handle
    }
}

/// The caller-facing handle of a started span. It owns the span's context
/// and is consumed by [`finish`], so a span cannot be finished twice.
///
/// [`finish`]: SpanHandle::finish
#[derive(Debug)]
pub struct SpanHandle {
    span: Arc<Span>,
    context: SpanContext,
}

impl SpanHandle {
    /// The shared span record.
    pub fn span(&self) -> &Arc<Span> {
        &self.span
    }

    /// The context propagated to descendants of this span.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Mutable access to the span's context, e.g. for attaching baggage
    /// or span links.
    pub fn context_mut(&mut self) -> &mut SpanContext {
        &mut self.context
    }

    /// Set a string tag on the span.
    ///
    /// The `manual.keep` and `manual.drop` tags are intercepted: instead
    /// of being stored they force the trace's sampling priority and
    /// decision.
    pub fn set_tag(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let enabled = !matches!(value.as_str(), "false" | "0");
        match key {
            tags::MANUAL_KEEP if enabled => {
                self.context
                    .set_sampling_priority(PRIORITY_USER_KEEP, SamplerName::Manual);
                self.context.keep();
            }
            tags::MANUAL_DROP if enabled => {
                self.context
                    .set_sampling_priority(PRIORITY_USER_REJECT, SamplerName::Manual);
                self.context.drop();
            }
            _ => self.span.set_tag(key, value),
        }
    }

    /// Set a numeric tag on the span.
    pub fn set_metric(&mut self, key: &str, value: f64) {
        self.span.set_metric(key, value);
    }

    /// Set the sampling priority of the owning trace, attributing it to
    /// `sampler`.
    pub fn set_sampling_priority(&mut self, priority: i32, sampler: SamplerName) {
        self.context.set_sampling_priority(priority, sampler);
    }

    /// Finish the span, handing it to the trace's finish protocol. The
    /// span's content must not be mutated afterwards.
    pub fn finish(self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as i64)
            .unwrap_or(0);
        self.span.set_duration((now - self.span.start()).max(0));
        self.context.finish();
    }
}

thread_local! {
    // One generator per thread; span identifier generation sits on the
    // hot path of every span start.
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

// Identifiers stay within the positive signed 64-bit range for wire
// compatibility, and zero is reserved as the absent sentinel.
fn random_id() -> u64 {
    CURRENT_RNG.with(|rng| loop {
        let id = rng.borrow_mut().random::<u64>() & (i64::MAX as u64);
        if id != 0 {
            return id;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemoryChunkSink, OptionSpanContextExt};

    fn test_tracer(sink: &InMemoryChunkSink) -> Tracer {
        Tracer::builder()
            .with_sink(sink.clone())
            .with_config(TracerConfig {
                service: "svc".to_string(),
                trace_128_bit_id_enabled: true,
                partial_flush_enabled: false,
                partial_flush_min_spans: 1_000,
                peer_service_defaults: false,
                peer_service_mappings: Default::default(),
            })
            .build()
    }

    #[test]
    fn root_span_gets_time_derived_upper_half() {
        let sink = InMemoryChunkSink::new();
        let tracer = test_tracer(&sink);
        let root = tracer.start("root");
        let trace_id = root.context().trace_id();
        assert!(trace_id.has_upper());
        // <32-bit unix seconds><32 zero bits>
        assert_eq!(trace_id.upper() & 0xffff_ffff, 0);
        assert_eq!(
            trace_id.upper() >> 32,
            (root.span().start() / 1_000_000_000) as u64
        );
    }

    #[test]
    fn child_shares_trace_and_upper_half() {
        let sink = InMemoryChunkSink::new();
        let tracer = test_tracer(&sink);
        let root = tracer.start("root");
        let child = tracer.span_builder("child").child_of(root.context()).start();

        assert_eq!(
            child.context().trace_id().lower(),
            root.context().trace_id().lower()
        );
        assert_eq!(
            child.context().trace_id().upper(),
            root.context().trace_id().upper()
        );
        assert_eq!(child.span().parent_id(), root.span().span_id());
        assert_ne!(child.span().span_id(), root.span().span_id());
    }

    #[test]
    fn baggage_only_parent_contributes_no_trace_linkage() {
        let sink = InMemoryChunkSink::new();
        let tracer = test_tracer(&sink);
        let carrier = SpanContext::baggage_only(
            [("user.id".to_string(), "42".to_string())],
            tracer.hooks(),
        );
        let span = tracer.span_builder("op").child_of(&carrier).start();

        assert_eq!(span.span().parent_id(), 0);
        assert_ne!(span.context().trace_id().lower(), 0);
        assert_eq!(span.context().baggage_item("user.id").as_deref(), Some("42"));
    }

    #[test]
    fn manual_keep_tag_forces_decision() {
        let sink = InMemoryChunkSink::new();
        let tracer = test_tracer(&sink);
        let mut root = tracer.start("root");
        root.set_tag(tags::MANUAL_KEEP, "true");
        assert_eq!(root.context().sampling_priority(), Some(PRIORITY_USER_KEEP));
        root.finish();

        let chunks = sink.get_submitted_chunks();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].will_send());
    }

    #[test]
    fn absent_context_reads_as_empty() {
        let absent: Option<&SpanContext> = None;
        assert_eq!(absent.span_id(), 0);
        assert_eq!(absent.trace_id(), crate::trace::TraceId::EMPTY);
        assert_eq!(absent.trace_id_hex(), crate::trace::TRACE_ID_ZERO);
        assert_eq!(absent.sampling_priority(), None);
        absent.for_each_baggage_item(&mut |_, _| panic!("no items expected"));
    }

    #[test]
    fn span_ids_are_non_zero_and_in_signed_range() {
        for _ in 0..64 {
            let id = random_id();
            assert_ne!(id, 0);
            assert!(id <= i64::MAX as u64);
        }
    }
}
