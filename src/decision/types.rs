use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::event::{EventId, EventSummary};
use crate::kernel::state::{Emotion, StateSnapshot};

/// Correlates an action with its asynchronous completion or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Speak,
    Emote,
    ThinkOnly,
    NoOp,
}

/// Answer of the external reasoning service, before the gateway stamps an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: ActionKind,
    pub text: Option<String>,
    pub emotion: Option<Emotion>,
}

impl Decision {
    pub fn speak(text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Speak,
            text: Some(text.into()),
            emotion: None,
        }
    }

    pub fn emote(emotion: Emotion) -> Self {
        Self {
            kind: ActionKind::Emote,
            text: None,
            emotion: Some(emotion),
        }
    }

    pub fn think(thought: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::ThinkOnly,
            text: Some(thought.into()),
            emotion: None,
        }
    }

    pub fn no_op() -> Self {
        Self {
            kind: ActionKind::NoOp,
            text: None,
            emotion: None,
        }
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }
}

/// A decided output, produced for exactly one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    pub text: Option<String>,
    pub emotion: Option<Emotion>,
    /// Event this action answers.
    pub event_id: EventId,
    /// Stand-in produced when no decision could be obtained in time.
    pub fallback: bool,
}

impl Action {
    pub fn from_decision(decision: Decision, event_id: EventId) -> Self {
        Self {
            id: ActionId::new(),
            kind: decision.kind,
            text: decision.text,
            emotion: decision.emotion,
            event_id,
            fallback: false,
        }
    }

    /// "No response" answer for urgent events the rate limiter starved.
    pub fn fallback(event_id: EventId) -> Self {
        Self {
            fallback: true,
            ..Self::from_decision(Decision::no_op(), event_id)
        }
    }

    /// Configured line spoken outside any decision (greeting, farewell).
    pub fn scripted(text: &str, emotion: Option<Emotion>) -> Self {
        let decision = Decision {
            emotion,
            ..Decision::speak(text)
        };
        Self::from_decision(decision, EventId::NONE)
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            id: self.id,
            kind: self.kind,
            text: self.text.clone(),
            emotion: self.emotion,
            fallback: self.fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub id: ActionId,
    pub kind: ActionKind,
    pub text: Option<String>,
    pub emotion: Option<Emotion>,
    pub fallback: bool,
}

/// Everything the reasoning service gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub state: StateSnapshot,
    pub event: EventSummary,
}
