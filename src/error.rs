use std::time::Duration;

use thiserror::Error;

use crate::kernel::event::{EventKind, Priority};

/// Why the queue refused an event. Neither case is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Queue was full and the incoming event did not outrank the lowest band.
    #[error("queue full ({capacity}), dropped incoming {kind:?} ({priority:?})")]
    Overflow {
        kind: EventKind,
        priority: Priority,
        capacity: usize,
    },

    /// Queue is draining; no new events are admitted.
    #[error("queue closed, refused {kind:?}")]
    Closed { kind: EventKind },
}

/// The rate limiter had no free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limited, next slot in {wait:?}")]
pub struct RateLimited {
    pub wait: Duration,
}

/// Why the decision gateway produced no action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionFailure {
    /// Rate limiter denied the call after the bounded wait.
    #[error("decision unavailable, rate limited for another {wait:?}")]
    Unavailable { wait: Duration },

    /// The external service failed.
    #[error("decision service error: {0}")]
    Error(String),

    /// The external service did not answer in time.
    #[error("decision service timed out after {0:?}")]
    Timeout(Duration),
}

impl From<RateLimited> for DecisionFailure {
    fn from(limited: RateLimited) -> Self {
        DecisionFailure::Unavailable { wait: limited.wait }
    }
}

/// Failures reported by output collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("output dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("no in-flight output for handle {0}")]
    UnknownHandle(u64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
