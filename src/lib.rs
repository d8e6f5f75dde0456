pub mod config;
pub mod decision;
pub mod error;
pub mod inputs;
pub mod kernel;
pub mod outputs;
pub mod services;

// Re-export specific items if needed for convenient access
pub use config::CohostConfig;
pub use kernel::event::{Event, EventKind, Priority};
pub use kernel::orchestrator::{Orchestrator, SessionReport, StepOutcome};
pub use kernel::queue::EventQueue;
pub use kernel::state::{Activity, Emotion, StateHandle};
