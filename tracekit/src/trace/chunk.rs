use crate::trace::Span;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A batch of spans released together for submission.
///
/// Chunks are produced by the trace buffer's finish protocol, either when
/// every buffered span has finished (full flush) or when enough spans have
/// finished to trigger a partial flush. A chunk is an immutable snapshot:
/// neither the span sequence nor the spans themselves may be mutated after
/// submission.
#[derive(Clone, Debug)]
pub struct Chunk {
    spans: Vec<Arc<Span>>,
    will_send: bool,
}

impl Chunk {
    pub(crate) fn new(spans: Vec<Arc<Span>>, will_send: bool) -> Self {
        Chunk { spans, will_send }
    }

    /// The spans being flushed, in buffer order.
    pub fn spans(&self) -> &[Arc<Span>] {
        &self.spans
    }

    /// Whether the trace's sampling decision was "keep" at flush time.
    pub fn will_send(&self) -> bool {
        self.will_send
    }
}

/// The submission boundary of the trace core.
///
/// Implementations take ownership of each chunk and are responsible for
/// serialization and export. `submit` is invoked synchronously from the
/// finish protocol, with the trace buffer's guard held: it must not block
/// indefinitely and must not call back into the trace core. Submission is
/// fire-and-forget from the buffer's perspective and there is no retry or
/// rollback.
pub trait ChunkSink: Send + Sync + fmt::Debug {
    /// Accept a flushed chunk for export.
    fn submit(&self, chunk: Chunk);
}

/// A [`ChunkSink`] that stores submitted chunks in memory.
///
/// This sink is useful for testing and debugging purposes. Chunks can be
/// retrieved using [`get_submitted_chunks`].
///
/// [`get_submitted_chunks`]: InMemoryChunkSink::get_submitted_chunks
///
/// # Example
/// ```
/// use tracekit::trace::{InMemoryChunkSink, Tracer};
///
/// let sink = InMemoryChunkSink::default();
/// let tracer = Tracer::builder().with_sink(sink.clone()).build();
///
/// let span = tracer.span_builder("say hello").start();
/// span.finish();
///
/// let chunks = sink.get_submitted_chunks();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].spans().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryChunkSink {
    chunks: Arc<Mutex<Vec<Chunk>>>,
}

impl InMemoryChunkSink {
    /// Creates a new in-memory sink.
    pub fn new() -> Self {
        InMemoryChunkSink::default()
    }

    /// Returns the chunks submitted so far.
    pub fn get_submitted_chunks(&self) -> Vec<Chunk> {
        self.chunks
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Clears the internal storage of submitted chunks.
    pub fn reset(&self) {
        let _ = self.chunks.lock().map(|mut guard| guard.clear());
    }
}

impl ChunkSink for InMemoryChunkSink {
    fn submit(&self, chunk: Chunk) {
        if let Ok(mut guard) = self.chunks.lock() {
            guard.push(chunk);
        }
    }
}
