use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Longest payload text carried into a decision context.
const SUMMARY_TEXT_LIMIT: usize = 200;

/// Process-unique, monotonically increasing. Breaks `created_at` ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl EventId {
    /// Never assigned to an event. Marks actions that answer none.
    pub const NONE: EventId = EventId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Tick,
    ChatMessage,
    ChatMention,
    StreamerSpeech,
    ScreenChange,
    Shutdown,
}

impl EventKind {
    /// Routing used when a producer does not pick a priority itself.
    pub fn default_priority(self) -> Priority {
        match self {
            EventKind::StreamerSpeech | EventKind::Shutdown => Priority::Critical,
            EventKind::ChatMention => Priority::High,
            EventKind::ChatMessage | EventKind::ScreenChange => Priority::Medium,
            EventKind::Tick => Priority::Low,
        }
    }
}

/// Totally ordered: `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Most urgent first. Index in this array is the queue band.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn band(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// MEDIUM and LOW may be shed under pressure; CRITICAL and HIGH wait.
    pub fn is_sheddable(self) -> bool {
        self <= Priority::Medium
    }
}

/// Immutable unit of work. Fields are private; clones are equally immutable.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    kind: EventKind,
    priority: Priority,
    source: String,
    payload: Value,
    created_at: Instant,
}

impl Event {
    pub fn new(kind: EventKind, source: impl Into<String>, payload: Value) -> Self {
        Self::with_priority(kind, kind.default_priority(), source, payload)
    }

    pub fn with_priority(
        kind: EventKind,
        priority: Priority,
        source: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: EventId(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            priority,
            source: source.into(),
            payload,
            created_at: Instant::now(),
        }
    }

    pub fn tick() -> Self {
        Self::new(EventKind::Tick, "tick", Value::Null)
    }

    pub fn shutdown(source: &str) -> Self {
        Self::new(EventKind::Shutdown, source, Value::Null)
    }

    pub fn chat_message(author: &str, text: &str) -> Self {
        Self::new(
            EventKind::ChatMessage,
            "chat",
            json!({ "author": author, "text": text }),
        )
    }

    pub fn chat_mention(author: &str, text: &str) -> Self {
        Self::new(
            EventKind::ChatMention,
            "chat",
            json!({ "author": author, "text": text }),
        )
    }

    pub fn streamer_speech(text: &str) -> Self {
        Self::new(EventKind::StreamerSpeech, "microphone", json!({ "text": text }))
    }

    pub fn screen_change(summary: &str) -> Self {
        Self::new(EventKind::ScreenChange, "screen", json!({ "text": summary }))
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// `text` field of the payload, when the producer supplied one.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Strict arrival order: `created_at`, then id.
    pub fn precedes(&self, other: &Event) -> bool {
        (self.created_at, self.id) < (other.created_at, other.id)
    }

    pub fn summary(&self, now: Instant) -> EventSummary {
        EventSummary {
            id: self.id,
            kind: self.kind,
            priority: self.priority,
            source: self.source.clone(),
            author: self
                .payload
                .get("author")
                .and_then(Value::as_str)
                .map(str::to_string),
            text: self.text().map(|t| truncate(t, SUMMARY_TEXT_LIMIT)),
            age_ms: self.age(now).as_millis() as u64,
        }
    }
}

/// Plain, serializable view of an event for decision contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: EventId,
    pub kind: EventKind,
    pub priority: Priority,
    pub source: String,
    pub author: Option<String>,
    pub text: Option<String>,
    pub age_ms: u64,
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
