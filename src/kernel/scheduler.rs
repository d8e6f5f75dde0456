use std::time::Duration;

use tokio::time::Instant;

use super::event::{Event, EventKind};
use super::state::Activity;
use crate::decision::types::{Action, ActionKind};

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Voice output; the action becomes the pending one.
    Speak(Action),
    /// Avatar output plus an immediate emotion change.
    Emote(Action),
    Log(String),
}

pub struct Scheduler;

impl Scheduler {
    /// Whether `event` is worth a decision given what we are doing.
    ///
    /// Speech and mentions always are. Plain chat and screen changes wait
    /// their turn while we talk. Ticks only drive idle commentary.
    pub fn should_decide(event: &Event, activity: Activity) -> bool {
        match event.kind() {
            EventKind::StreamerSpeech | EventKind::ChatMention => true,
            EventKind::ChatMessage | EventKind::ScreenChange => activity != Activity::Speaking,
            EventKind::Tick => activity == Activity::Idle,
            EventKind::Shutdown => false,
        }
    }

    /// Idle commentary is due once the co-host has been quiet, and has not
    /// asked for commentary, for at least `cooldown`.
    pub fn commentary_due(last_output: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
        last_output.map_or(true, |at| now.saturating_duration_since(at) >= cooldown)
    }

    /// Pure projection: Action -> side effects, in execution order.
    pub fn schedule(action: &Action) -> Vec<SideEffect> {
        match action.kind {
            ActionKind::NoOp => Vec::new(),
            ActionKind::ThinkOnly => {
                let thought = action.text.as_deref().unwrap_or("");
                vec![SideEffect::Log(format!("Thought: {}", thought))]
            }
            ActionKind::Emote => match action.emotion {
                Some(_) => vec![SideEffect::Emote(action.clone())],
                None => vec![SideEffect::Log("Emote without emotion ignored".to_string())],
            },
            ActionKind::Speak => {
                let mut effects = Vec::with_capacity(2);
                if action.emotion.is_some() {
                    effects.push(SideEffect::Emote(action.clone()));
                }
                match action.text.as_deref() {
                    Some(text) if !text.trim().is_empty() => {
                        effects.push(SideEffect::Speak(action.clone()))
                    }
                    _ => effects.push(SideEffect::Log("Speak without text ignored".to_string())),
                }
                effects
            }
        }
    }
}
