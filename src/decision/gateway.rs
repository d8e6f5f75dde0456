use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use super::types::{Action, ActionKind, Decision, DecisionContext};
use crate::error::DecisionFailure;
use crate::kernel::event::Event;
use crate::kernel::state::StateSnapshot;

/// The external reasoning service. One call per decision, no retries.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, context: &DecisionContext) -> anyhow::Result<Decision>;
}

/// Turns (state, event) into an Action, behind the rate limiter.
pub struct DecisionGateway {
    service: Arc<dyn DecisionService>,
    limiter: RateLimiter,
    /// How long CRITICAL/HIGH events may wait for a slot.
    max_wait: Duration,
    timeout: Duration,
}

impl DecisionGateway {
    pub fn new(
        service: Arc<dyn DecisionService>,
        limiter: RateLimiter,
        max_wait: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            limiter,
            max_wait,
            timeout,
        }
    }

    /// MEDIUM/LOW events get no wait at all: under rate pressure they are
    /// shed rather than delaying the loop.
    pub async fn decide(
        &self,
        snapshot: StateSnapshot,
        event: &Event,
    ) -> Result<Action, DecisionFailure> {
        let max_wait = if event.priority().is_sheddable() {
            Duration::ZERO
        } else {
            self.max_wait
        };
        self.limiter.acquire(max_wait).await?;

        let context = DecisionContext {
            state: snapshot,
            event: event.summary(Instant::now()),
        };

        let decision = match timeout(self.timeout, self.service.decide(&context)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!("Decision service error for {:?}: {:#}", event.kind(), e);
                return Err(DecisionFailure::Error(format!("{:#}", e)));
            }
            Err(_) => {
                warn!("Decision service timed out after {:?}", self.timeout);
                return Err(DecisionFailure::Timeout(self.timeout));
            }
        };

        let action = Action::from_decision(sanitize(decision), event.id());
        info!("Decision for {:?}: {:?} ({})", event.kind(), action.kind, action.id);
        Ok(action)
    }

    pub fn remaining_budget(&self) -> usize {
        self.limiter.remaining()
    }
}

/// A SPEAK with nothing to say is a NO_OP.
fn sanitize(decision: Decision) -> Decision {
    let blank = decision
        .text
        .as_deref()
        .map_or(true, |text| text.trim().is_empty());
    if decision.kind == ActionKind::Speak && blank {
        debug!("Empty speech decision treated as NO_OP");
        return Decision {
            kind: ActionKind::NoOp,
            text: None,
            emotion: None,
        };
    }
    decision
}
