use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use super::event::{Event, EventKind, EventSummary};
use crate::decision::types::{Action, ActionId, ActionSummary};

/// Actions kept for the decision context.
const RECENT_ACTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Activity {
    #[default]
    Idle,
    Listening,
    Speaking,
    Thinking,
}

/// Avatar expression vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Excited,
    Focused,
    Surprised,
    Thinking,
    Confused,
    Angry,
}

impl Emotion {
    pub const ALL: [Emotion; 9] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Excited,
        Emotion::Focused,
        Emotion::Surprised,
        Emotion::Thinking,
        Emotion::Confused,
        Emotion::Angry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Excited => "excited",
            Emotion::Focused => "focused",
            Emotion::Surprised => "surprised",
            Emotion::Thinking => "thinking",
            Emotion::Confused => "confused",
            Emotion::Angry => "angry",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion '{0}'")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(label))
            .ok_or_else(|| UnknownEmotion(label.to_string()))
    }
}

/// How an output collaborator ended an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Finished,
    Cancelled,
    Failed,
    /// The completion was dropped without being reported.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionResult {
    Applied { activity: Activity },
    /// The action is no longer pending. Expected after an interruption.
    Stale,
}

/// The co-host's mutable view of the world.
///
/// Fields are private; every mutation goes through a method that keeps
/// `activity == Speaking` equivalent to `pending_action_id.is_some()`.
#[derive(Debug, Clone)]
pub struct SharedState {
    activity: Activity,
    emotion: Emotion,
    started_at: Instant,
    last_speaker_activity_at: Option<Instant>,
    last_ai_activity_at: Option<Instant>,
    pending_action_id: Option<ActionId>,
    recent_events: VecDeque<Event>,
    recent_actions: VecDeque<ActionSummary>,
    context_limit: usize,
    /// Monotonic, bumped on every mutation.
    version: u64,
    interruptions: u64,
    completed_actions: u64,
    stale_completions: u64,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(20)
    }
}

impl SharedState {
    pub fn new(context_limit: usize) -> Self {
        Self {
            activity: Activity::Idle,
            emotion: Emotion::Neutral,
            started_at: Instant::now(),
            last_speaker_activity_at: None,
            last_ai_activity_at: None,
            pending_action_id: None,
            recent_events: VecDeque::with_capacity(context_limit),
            recent_actions: VecDeque::with_capacity(RECENT_ACTIONS),
            context_limit,
            version: 0,
            interruptions: 0,
            completed_actions: 0,
            stale_completions: 0,
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn emotion(&self) -> Emotion {
        self.emotion
    }

    pub fn pending_action_id(&self) -> Option<ActionId> {
        self.pending_action_id
    }

    pub fn last_speaker_activity_at(&self) -> Option<Instant> {
        self.last_speaker_activity_at
    }

    pub fn last_ai_activity_at(&self) -> Option<Instant> {
        self.last_ai_activity_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }

    pub fn completed_actions(&self) -> u64 {
        self.completed_actions
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale_completions
    }

    fn set_activity(&mut self, next: Activity) {
        if self.activity != next {
            debug!("Activity {:?} -> {:?}", self.activity, next);
            self.activity = next;
        }
    }

    /// Step 3 of the loop. `higher_pending` is whether the queue still holds
    /// something more urgent than `event`.
    pub fn merge_event(&mut self, event: &Event, higher_pending: bool, now: Instant) {
        self.version += 1;

        if self.recent_events.len() >= self.context_limit {
            self.recent_events.pop_front();
        }
        if self.context_limit > 0 {
            self.recent_events.push_back(event.clone());
        }

        match event.kind() {
            EventKind::Tick | EventKind::Shutdown => {}
            EventKind::ChatMessage | EventKind::ChatMention | EventKind::ScreenChange => {
                if self.activity == Activity::Idle && !higher_pending {
                    self.set_activity(Activity::Thinking);
                }
            }
            EventKind::StreamerSpeech => {
                self.last_speaker_activity_at = Some(now);
                // The orchestrator interrupts first; this keeps the invariant
                // if it did not.
                if self.pending_action_id.take().is_some() {
                    self.interruptions += 1;
                }
                self.set_activity(Activity::Listening);
            }
        }
    }

    /// Interruption protocol, state half. Returns the cancelled action id.
    pub fn interrupt(&mut self, now: Instant) -> Option<ActionId> {
        if self.activity != Activity::Speaking {
            return None;
        }
        self.version += 1;
        self.interruptions += 1;
        self.last_speaker_activity_at = Some(now);
        let interrupted = self.pending_action_id.take();
        self.set_activity(Activity::Listening);
        interrupted
    }

    /// A SPEAK action goes in flight. Only one speech is in flight at a
    /// time: while another is pending nothing changes and the pending id is
    /// returned as `Err`. Emotion is applied separately, through `set_emotion`.
    pub fn begin_speaking(&mut self, action: &Action, now: Instant) -> Result<(), ActionId> {
        if let Some(current) = self.pending_action_id {
            return Err(current);
        }
        self.version += 1;
        self.last_ai_activity_at = Some(now);
        self.pending_action_id = Some(action.id);
        self.set_activity(Activity::Speaking);
        Ok(())
    }

    pub fn set_emotion(&mut self, emotion: Emotion, now: Instant) {
        self.version += 1;
        self.last_ai_activity_at = Some(now);
        if self.emotion != emotion {
            debug!("Emotion {} -> {}", self.emotion, emotion);
            self.emotion = emotion;
        }
    }

    pub fn record_action(&mut self, action: &Action) {
        if self.recent_actions.len() >= RECENT_ACTIONS {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(action.summary());
    }

    /// Completion path. Applies only when `id` is still the pending action.
    pub fn complete_action(
        &mut self,
        id: ActionId,
        outcome: CompletionOutcome,
        now: Instant,
    ) -> CompletionResult {
        if self.pending_action_id != Some(id) {
            self.stale_completions += 1;
            debug!("Stale completion for {} ({:?}) ignored", id, outcome);
            return CompletionResult::Stale;
        }

        self.version += 1;
        self.completed_actions += 1;
        self.last_ai_activity_at = Some(now);
        // Streamer speech always clears the pending action first, so an
        // applied completion means nobody talked over us.
        self.pending_action_id = None;
        self.set_activity(Activity::Idle);
        CompletionResult::Applied {
            activity: Activity::Idle,
        }
    }

    /// Output refused the action. Same guard as a completion.
    pub fn abort_action(&mut self, id: ActionId) -> bool {
        if self.pending_action_id != Some(id) {
            return false;
        }
        self.version += 1;
        self.pending_action_id = None;
        self.set_activity(Activity::Idle);
        true
    }

    /// No action for the current event. Leaves an in-flight SPEAK alone.
    pub fn abandon_decision(&mut self) {
        if self.activity != Activity::Speaking {
            self.version += 1;
            self.set_activity(Activity::Idle);
        }
    }

    /// End-of-iteration decay: THINKING ends with the iteration, LISTENING
    /// once the streamer has been quiet for `listening_window`.
    pub fn settle(&mut self, now: Instant, listening_window: Duration) {
        match self.activity {
            Activity::Thinking => {
                self.version += 1;
                self.set_activity(Activity::Idle);
            }
            Activity::Listening => {
                let quiet = self
                    .last_speaker_activity_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= listening_window);
                if quiet {
                    self.version += 1;
                    self.set_activity(Activity::Idle);
                }
            }
            Activity::Idle | Activity::Speaking => {}
        }
    }

    /// Shutdown: drop whatever is pending and return to IDLE.
    pub fn force_idle(&mut self) -> Option<ActionId> {
        self.version += 1;
        self.set_activity(Activity::Idle);
        self.pending_action_id.take()
    }

    pub fn snapshot(&self, now: Instant) -> StateSnapshot {
        let since = |at: Option<Instant>| at.map(|t| now.saturating_duration_since(t).as_millis() as u64);
        StateSnapshot {
            activity: self.activity,
            emotion: self.emotion,
            pending_action: self.pending_action_id,
            speaker_idle_ms: since(self.last_speaker_activity_at),
            ai_idle_ms: since(self.last_ai_activity_at),
            uptime_ms: now.saturating_duration_since(self.started_at).as_millis() as u64,
            version: self.version,
            recent_events: self.recent_events.iter().map(|e| e.summary(now)).collect(),
            recent_actions: self.recent_actions.iter().cloned().collect(),
        }
    }
}

/// Read-only copy handed to the decision gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub activity: Activity,
    pub emotion: Emotion,
    pub pending_action: Option<ActionId>,
    pub speaker_idle_ms: Option<u64>,
    pub ai_idle_ms: Option<u64>,
    pub uptime_ms: u64,
    pub version: u64,
    pub recent_events: Vec<EventSummary>,
    pub recent_actions: Vec<ActionSummary>,
}

/// Shared ownership of the state between the loop and completion callbacks.
///
/// Readers get copies. The only public mutation is [`StateHandle::complete`];
/// everything else is reserved to the orchestrator.
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<Mutex<SharedState>>,
    changed: Arc<Notify>,
}

impl StateHandle {
    pub fn new(state: SharedState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            changed: Arc::new(Notify::new()),
        }
    }

    // Methods never leave SharedState half-updated, so poisoning is benign.
    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&SharedState) -> R) -> R {
        f(&self.lock())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_waiters();
        result
    }

    pub fn activity(&self) -> Activity {
        self.read(SharedState::activity)
    }

    pub fn emotion(&self) -> Emotion {
        self.read(SharedState::emotion)
    }

    pub fn pending_action_id(&self) -> Option<ActionId> {
        self.read(SharedState::pending_action_id)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let now = Instant::now();
        self.read(|state| state.snapshot(now))
    }

    /// Narrow writer path for output collaborators.
    pub fn complete(&self, id: ActionId, outcome: CompletionOutcome) -> CompletionResult {
        let result = self.update(|state| state.complete_action(id, outcome, Instant::now()));
        if let CompletionResult::Applied { activity } = result {
            info!("Action {} completed ({:?}), now {:?}", id, outcome, activity);
        }
        result
    }

    /// Resolves once nothing is pending.
    pub async fn wait_until_settled(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending_action_id().is_none() {
                return;
            }
            notified.await;
        }
    }
}
