pub mod client;

pub use client::{parse_decision, LlmDecisionService};
