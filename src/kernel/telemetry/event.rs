use serde::{Deserialize, Serialize};

use crate::decision::types::ActionKind;
use crate::kernel::event::{EventKind, Priority};
use crate::kernel::lifecycle::Phase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    PhaseTransition {
        from: Phase,
        to: Phase,
    },

    EventProcessed {
        kind: EventKind,
        priority: Priority,
        queue_wait_ms: u64,
    },

    /// Popped but not worth a decision right now. Still in the context.
    EventSkipped {
        kind: EventKind,
    },

    EventDropped {
        kind: EventKind,
        priority: Priority,
        reason: DropReason,
    },

    Decision {
        kind: EventKind,
        outcome: DecisionOutcome,
        latency_ms: u64,
    },

    ActionDispatched {
        kind: ActionKind,
        fallback: bool,
    },

    DispatchFailed {
        kind: ActionKind,
    },

    Interruption {
        purged_events: usize,
        cancel_requested: bool,
        /// From popping the speech event to the cancel request returning.
        cancel_latency_us: u64,
    },

    /// A SPEAK decided while another was still in flight, not voiced.
    SpeechDeclined,

    ShutdownCancelled {
        in_flight: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Older than the configured maximum age when popped.
    Stale,
    /// No decision slot for a sheddable event.
    RatePressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    Decided,
    /// Urgent event starved by the rate limiter; answered with NO_OP.
    Fallback,
    Unavailable,
    Error,
    Timeout,
    /// Abandoned because the streamer started speaking.
    Superseded,
}
