//! # Span
//!
//! A span is one timed unit of work within a trace. Spans are shared
//! between the caller that eventually finishes them and the trace buffer
//! that flushes them, so the identifier fields are immutable while the
//! mutable record (tags, metrics, finished flag) lives behind a single
//! guard.
//!
//! Once a span's finished flag is observably `true` and the span has been
//! included in a submitted [`Chunk`], its content must no longer be
//! mutated: the chunk may already be undergoing serialization by another
//! thread. Submitted chunks are read-only snapshots.
//!
//! [`Chunk`]: crate::trace::Chunk

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    span_id: u64,
    trace_id_lower: u64,
    parent_id: u64,
    start: i64,
    // Captured by the owning span context right after construction and
    // immutable afterwards; read lock-free when stamping trace-level tags.
    trace_id_upper: AtomicU64,
    state: Mutex<SpanState>,
}

#[derive(Debug, Default)]
struct SpanState {
    name: String,
    service: String,
    resource: String,
    meta: HashMap<String, String>,
    metrics: HashMap<String, f64>,
    duration: i64,
    finished: bool,
}

impl Span {
    pub(crate) fn new(
        name: impl Into<String>,
        service: impl Into<String>,
        resource: impl Into<String>,
        span_id: u64,
        trace_id_lower: u64,
        parent_id: u64,
        start: i64,
    ) -> Self {
        Span {
            span_id,
            trace_id_lower,
            parent_id,
            start,
            trace_id_upper: AtomicU64::new(0),
            state: Mutex::new(SpanState {
                name: name.into(),
                service: service.into(),
                resource: resource.into(),
                ..SpanState::default()
            }),
        }
    }

    /// The span's own 64-bit identifier.
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// The lower 64 bits of the identifier of the trace this span belongs to.
    pub fn trace_id_lower(&self) -> u64 {
        self.trace_id_lower
    }

    /// The identifier of this span's parent, or zero for local roots.
    pub fn parent_id(&self) -> u64 {
        self.parent_id
    }

    /// The span start time, in nanoseconds since the Unix epoch.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// The upper 64 bits of the trace identifier, zero in 64-bit mode.
    pub fn trace_id_upper(&self) -> u64 {
        self.trace_id_upper.load(Ordering::Relaxed)
    }

    pub(crate) fn set_trace_id_upper(&self, upper: u64) {
        self.trace_id_upper.store(upper, Ordering::Relaxed);
    }

    /// The span's operation name.
    pub fn name(&self) -> String {
        self.with_state(|s| s.name.clone()).unwrap_or_default()
    }

    /// The name of the service this span was produced by.
    pub fn service(&self) -> String {
        self.with_state(|s| s.service.clone()).unwrap_or_default()
    }

    /// The resource this span operates on.
    pub fn resource(&self) -> String {
        self.with_state(|s| s.resource.clone()).unwrap_or_default()
    }

    /// The span duration in nanoseconds, zero while unfinished.
    pub fn duration(&self) -> i64 {
        self.with_state(|s| s.duration).unwrap_or_default()
    }

    /// Returns `true` once the span has been finished.
    pub fn is_finished(&self) -> bool {
        self.with_state(|s| s.finished).unwrap_or_default()
    }

    /// The value of the string tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<String> {
        self.with_state(|s| s.meta.get(key).cloned()).flatten()
    }

    /// The value of the numeric tag `key`, if present.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.with_state(|s| s.metrics.get(key).copied()).flatten()
    }

    /// A snapshot of all string tags currently set on the span.
    pub fn tags(&self) -> HashMap<String, String> {
        self.with_state(|s| s.meta.clone()).unwrap_or_default()
    }

    pub(crate) fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.with_state_mut(|s| {
            s.meta.insert(key, value);
        });
    }

    pub(crate) fn set_metric(&self, key: impl Into<String>, value: f64) {
        let key = key.into();
        self.with_state_mut(|s| {
            s.metrics.insert(key, value);
        });
    }

    pub(crate) fn set_duration(&self, duration: i64) {
        self.with_state_mut(|s| s.duration = duration);
    }

    pub(crate) fn mark_finished(&self) {
        self.with_state_mut(|s| s.finished = true);
    }

    pub(crate) fn with_tags_mut<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Option<T> {
        self.with_state_mut(|s| f(&mut s.meta))
    }

    fn with_state<T>(&self, f: impl FnOnce(&SpanState) -> T) -> Option<T> {
        self.state.lock().ok().map(|guard| f(&guard))
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut SpanState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut guard| f(&mut guard))
    }
}
