use std::collections::VecDeque;

use super::event::{DropReason, TelemetryEvent};
use super::metrics::{compute_snapshot, TelemetrySnapshot};

const MAX_EVENTS: usize = 10_000;

/// Lifetime drop counts. Unlike the buffer, these never wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropTotals {
    pub stale: u64,
    pub rate_pressure: u64,
}

#[derive(Debug, Default)]
pub struct TelemetryRecorder {
    buffer: VecDeque<TelemetryEvent>,
    drops: DropTotals,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_EVENTS),
            drops: DropTotals::default(),
        }
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        if let TelemetryEvent::EventDropped { reason, .. } = &event {
            match reason {
                DropReason::Stale => self.drops.stale += 1,
                DropReason::RatePressure => self.drops.rate_pressure += 1,
            }
        }
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Aggregates over the buffered window; drop counts cover the whole run.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mut snap = compute_snapshot(&self.buffer);
        snap.event_stats.dropped_stale = self.drops.stale;
        snap.event_stats.dropped_rate_pressure = self.drops.rate_pressure;
        snap
    }

    pub fn drop_totals(&self) -> DropTotals {
        self.drops
    }

    pub fn events(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.drops = DropTotals::default();
    }
}
