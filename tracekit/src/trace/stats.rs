use std::fmt;
use std::sync::{Arc, Mutex};

/// A fire-and-forget health signal emitted by the trace core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stat {
    /// A trace exceeded the buffer capacity and was abandoned.
    TracesDropped(u64),
    /// Spans were pushed into a trace buffer.
    SpansStarted(u64),
    /// A partial flush fired, closing `closed` spans and leaving
    /// `remaining` spans buffered.
    PartialFlush {
        /// Number of finished spans released by the flush.
        closed: usize,
        /// Number of unfinished spans kept in the buffer.
        remaining: usize,
    },
}

/// Telemetry counter sink. Signals are fire-and-forget and must never
/// affect control flow.
pub trait StatsSink: Send + Sync + fmt::Debug {
    /// Record one signal.
    fn record(&self, stat: Stat);
}

/// A [`StatsSink`] that discards every signal.
#[derive(Clone, Debug, Default)]
pub struct NoopStatsSink;

impl StatsSink for NoopStatsSink {
    fn record(&self, _stat: Stat) {}
}

/// A [`StatsSink`] that stores every signal in memory, for tests.
#[derive(Clone, Debug, Default)]
pub struct RecordingStatsSink {
    stats: Arc<Mutex<Vec<Stat>>>,
}

impl RecordingStatsSink {
    /// Creates a new recording sink.
    pub fn new() -> Self {
        RecordingStatsSink::default()
    }

    /// Returns the signals recorded so far.
    pub fn recorded(&self) -> Vec<Stat> {
        self.stats
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Sum of spans reported started.
    pub fn spans_started(&self) -> u64 {
        self.recorded()
            .iter()
            .map(|s| match s {
                Stat::SpansStarted(n) => *n,
                _ => 0,
            })
            .sum()
    }

    /// Sum of traces reported dropped.
    pub fn traces_dropped(&self) -> u64 {
        self.recorded()
            .iter()
            .map(|s| match s {
                Stat::TracesDropped(n) => *n,
                _ => 0,
            })
            .sum()
    }
}

impl StatsSink for RecordingStatsSink {
    fn record(&self, stat: Stat) {
        if let Ok(mut guard) = self.stats.lock() {
            guard.push(stat);
        }
    }
}
