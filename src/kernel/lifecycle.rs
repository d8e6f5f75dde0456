use serde::{Deserialize, Serialize};

/// Orchestrator lifecycle. STOPPED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// State reset to IDLE, tick source not yet running.
    #[default]
    Starting,
    /// Steady-state loop.
    Running,
    /// SHUTDOWN observed: no admission, in-flight speech gets a grace period.
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRequest {
    Started,
    ShutdownObserved,
    Drained,
}

pub struct PhaseGraph;

impl PhaseGraph {
    /// Pure function: (Current Phase, Request) -> New Phase.
    /// `None` means the request is ignored in this phase.
    pub fn transition(current: Phase, request: PhaseRequest) -> Option<Phase> {
        use Phase::*;
        use PhaseRequest::*;

        match (current, request) {
            (Starting, Started) => Some(Running),
            // Shutdown can arrive before the loop ever ran.
            (Starting, ShutdownObserved) => Some(Draining),
            (Running, ShutdownObserved) => Some(Draining),
            (Draining, Drained) => Some(Stopped),
            _ => None,
        }
    }
}
