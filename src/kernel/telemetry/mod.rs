//! Instrumentation for the orchestrator loop.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer. It is never read by the
//! loop, the queue or the gateway when deciding anything.
//!
//! # PRIVACY INVARIANT
//! Telemetry events carry kinds, priorities, counts and durations only,
//! never chat text, speech text or payloads.

pub mod event;
pub mod metrics;
pub mod recorder;
