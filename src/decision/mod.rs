pub mod gateway;
pub mod rate_limit;
pub mod types;

pub use gateway::{DecisionGateway, DecisionService};
pub use rate_limit::RateLimiter;
pub use types::{Action, ActionId, ActionKind, Decision, DecisionContext};
