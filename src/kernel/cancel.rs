use super::event::{Event, EventKind};
use super::state::Activity;

/// Pure decisions of the interruption protocol. The orchestrator applies them.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterruptionPolicy;

impl InterruptionPolicy {
    /// Streamer speech over our own speech, and nothing else, interrupts.
    pub fn should_interrupt(event: &Event, activity: Activity) -> bool {
        event.kind() == EventKind::StreamerSpeech && activity == Activity::Speaking
    }

    /// Queued work that would only lead to more talking. Once the streamer
    /// speaks it is stale, unless it is CRITICAL/HIGH.
    pub fn is_stale_after_speech(event: &Event) -> bool {
        event.priority().is_sheddable()
            && matches!(
                event.kind(),
                EventKind::Tick
                    | EventKind::ChatMessage
                    | EventKind::ChatMention
                    | EventKind::ScreenChange
            )
    }
}
