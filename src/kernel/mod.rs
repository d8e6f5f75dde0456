pub mod cancel;
pub mod event;
pub mod lifecycle;
pub mod orchestrator;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod telemetry;
