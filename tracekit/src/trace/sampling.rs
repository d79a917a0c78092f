//! Sampling vocabulary: the tri-state per-trace decision, sampler
//! identities and the priority levels they produce.

/// Span belongs to a trace a user explicitly asked to reject.
pub const PRIORITY_USER_REJECT: i32 = -1;

/// Span belongs to a trace the automatic sampler rejected.
pub const PRIORITY_AUTO_REJECT: i32 = 0;

/// Span belongs to a trace the automatic sampler kept.
pub const PRIORITY_AUTO_KEEP: i32 = 1;

/// Span belongs to a trace a user explicitly asked to keep.
pub const PRIORITY_USER_KEEP: i32 = 2;

/// The decision to hand a trace to the submission sink or not.
///
/// A trace starts out [`Undecided`] and moves exactly once to either
/// [`Drop`] or [`Keep`]; the first writer wins and the decision never
/// changes afterwards.
///
/// [`Undecided`]: SamplingDecision::Undecided
/// [`Drop`]: SamplingDecision::Drop
/// [`Keep`]: SamplingDecision::Keep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum SamplingDecision {
    /// No decision has been made about the trace. An undecided trace is
    /// not sent to the sink.
    #[default]
    Undecided = 0,
    /// The trace will not be sent to the sink.
    Drop = 1,
    /// The trace will be sent to the sink.
    Keep = 2,
}

impl SamplingDecision {
    pub(crate) fn as_u32(self) -> u32 {
        self as u32
    }

    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            1 => SamplingDecision::Drop,
            2 => SamplingDecision::Keep,
            _ => SamplingDecision::Undecided,
        }
    }
}

/// The sampling mechanism responsible for a sampling priority.
///
/// The numeric identifiers are stable and propagate across process
/// boundaries through the decision-maker tag; they must not be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerName {
    /// The mechanism is not known. Used when adopting a priority that was
    /// set before reaching this library, e.g. through a raw metric.
    Unknown,
    /// The default sampler, applied when no rate is known.
    Default,
    /// A rate supplied by the submission backend.
    AgentRate,
    /// A remotely configured global rate.
    RemoteRate,
    /// A locally configured sampling rule.
    RuleRate,
    /// A manual, user-issued keep or drop.
    Manual,
    /// The application security monitor.
    AppSec,
    /// A single-span sampling rule.
    SingleSpan,
}

impl SamplerName {
    /// The stable numeric identifier carried on the wire.
    pub fn wire_id(self) -> i8 {
        match self {
            SamplerName::Unknown => -1,
            SamplerName::Default => 0,
            SamplerName::AgentRate => 1,
            SamplerName::RemoteRate => 2,
            SamplerName::RuleRate => 3,
            SamplerName::Manual => 4,
            SamplerName::AppSec => 5,
            SamplerName::SingleSpan => 8,
        }
    }

    /// The value stored under the decision-maker tag for this sampler.
    pub(crate) fn decision_maker_value(self) -> String {
        format!("-{}", self.wire_id())
    }
}
