use std::collections::VecDeque;

use super::event::{DecisionOutcome, DropReason, TelemetryEvent};
use crate::decision::types::ActionKind;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub event_stats: EventStats,
    pub decision_stats: DecisionStats,
    pub dispatch_stats: DispatchStats,
    pub interruption_stats: InterruptionStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStats {
    pub processed: u64,
    pub skipped: u64,
    pub dropped_stale: u64,
    pub dropped_rate_pressure: u64,
    pub avg_queue_wait_ms: f64,
    pub max_queue_wait_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionStats {
    pub decided: u64,
    pub fallbacks: u64,
    pub unavailable: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub superseded: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchStats {
    pub speak: u64,
    pub emote: u64,
    pub think_only: u64,
    pub no_op: u64,
    pub failures: u64,
    pub declined_speech: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterruptionStats {
    pub count: u64,
    pub cancel_requests: u64,
    pub purged_events: u64,
    pub max_cancel_latency_us: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    let mut total_wait_ms = 0u64;
    let mut total_latency_ms = 0u64;
    let mut timed_decisions = 0u64;

    for event in events {
        match event {
            TelemetryEvent::EventProcessed { queue_wait_ms, .. } => {
                snap.event_stats.processed += 1;
                total_wait_ms += queue_wait_ms;
                snap.event_stats.max_queue_wait_ms =
                    snap.event_stats.max_queue_wait_ms.max(*queue_wait_ms);
            }
            TelemetryEvent::EventSkipped { .. } => snap.event_stats.skipped += 1,
            TelemetryEvent::EventDropped { reason, .. } => match reason {
                DropReason::Stale => snap.event_stats.dropped_stale += 1,
                DropReason::RatePressure => snap.event_stats.dropped_rate_pressure += 1,
            },
            TelemetryEvent::Decision {
                outcome,
                latency_ms,
                ..
            } => {
                match outcome {
                    DecisionOutcome::Decided => snap.decision_stats.decided += 1,
                    DecisionOutcome::Fallback => snap.decision_stats.fallbacks += 1,
                    DecisionOutcome::Unavailable => snap.decision_stats.unavailable += 1,
                    DecisionOutcome::Error => snap.decision_stats.errors += 1,
                    DecisionOutcome::Timeout => snap.decision_stats.timeouts += 1,
                    DecisionOutcome::Superseded => snap.decision_stats.superseded += 1,
                }
                total_latency_ms += latency_ms;
                timed_decisions += 1;
            }
            TelemetryEvent::ActionDispatched { kind, .. } => match kind {
                ActionKind::Speak => snap.dispatch_stats.speak += 1,
                ActionKind::Emote => snap.dispatch_stats.emote += 1,
                ActionKind::ThinkOnly => snap.dispatch_stats.think_only += 1,
                ActionKind::NoOp => snap.dispatch_stats.no_op += 1,
            },
            TelemetryEvent::DispatchFailed { .. } => snap.dispatch_stats.failures += 1,
            TelemetryEvent::SpeechDeclined => snap.dispatch_stats.declined_speech += 1,
            TelemetryEvent::Interruption {
                purged_events,
                cancel_requested,
                cancel_latency_us,
            } => {
                snap.interruption_stats.count += 1;
                snap.interruption_stats.purged_events += *purged_events as u64;
                if *cancel_requested {
                    snap.interruption_stats.cancel_requests += 1;
                }
                snap.interruption_stats.max_cancel_latency_us = snap
                    .interruption_stats
                    .max_cancel_latency_us
                    .max(*cancel_latency_us);
            }
            TelemetryEvent::PhaseTransition { .. } | TelemetryEvent::ShutdownCancelled { .. } => {}
        }
    }

    if snap.event_stats.processed > 0 {
        snap.event_stats.avg_queue_wait_ms =
            total_wait_ms as f64 / snap.event_stats.processed as f64;
    }
    if timed_decisions > 0 {
        snap.decision_stats.avg_latency_ms = total_latency_ms as f64 / timed_decisions as f64;
    }

    snap
}
