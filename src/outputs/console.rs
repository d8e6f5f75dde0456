use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Completion, CompletionHandle, OutputCollaborator};
use crate::decision::types::Action;
use crate::error::OutputError;
use crate::kernel::state::CompletionOutcome;

const WORDS_PER_MINUTE: f64 = 150.0;
const CHARS_PER_WORD: f64 = 5.0;
const MIN_SPEECH: Duration = Duration::from_millis(500);

/// Rough speaking time for `text`: ~150 words per minute.
pub fn estimate_duration(text: &str) -> Duration {
    let words = text.chars().count() as f64 / CHARS_PER_WORD;
    Duration::from_secs_f64(words / WORDS_PER_MINUTE * 60.0).max(MIN_SPEECH)
}

type Inflight = Arc<Mutex<HashMap<u64, CancellationToken>>>;

fn lock(inflight: &Inflight) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Logs speech and holds it for its estimated duration. Cancellable.
#[derive(Debug, Default)]
pub struct ConsoleVoice {
    next_handle: AtomicU64,
    inflight: Inflight,
}

impl ConsoleVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }
}

impl OutputCollaborator for ConsoleVoice {
    fn name(&self) -> &str {
        "console-voice"
    }

    fn perform(
        &self,
        action: &Action,
        completion: Completion,
    ) -> Result<CompletionHandle, OutputError> {
        let text = action
            .text
            .clone()
            .ok_or_else(|| OutputError::DispatchFailed("speech without text".to_string()))?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        lock(&self.inflight).insert(handle, token.clone());

        let duration = estimate_duration(&text);
        info!("[VOICE {}] {}", action.id, text);

        let inflight = Arc::clone(&self.inflight);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = sleep(duration) => CompletionOutcome::Finished,
                _ = token.cancelled() => CompletionOutcome::Cancelled,
            };
            lock(&inflight).remove(&handle);
            completion.finish(outcome);
        });

        Ok(CompletionHandle(handle))
    }

    fn cancel(&self, handle: CompletionHandle) -> Result<(), OutputError> {
        match lock(&self.inflight).get(&handle.0) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(OutputError::UnknownHandle(handle.0)),
        }
    }
}

/// Logs expression changes. Nothing to wait for, nothing to stop.
#[derive(Debug, Default)]
pub struct ConsoleAvatar {
    next_handle: AtomicU64,
}

impl ConsoleAvatar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputCollaborator for ConsoleAvatar {
    fn name(&self) -> &str {
        "console-avatar"
    }

    fn perform(
        &self,
        action: &Action,
        completion: Completion,
    ) -> Result<CompletionHandle, OutputError> {
        let Some(emotion) = action.emotion else {
            warn!("Avatar asked to perform {:?} without an emotion", action.kind);
            return Err(OutputError::DispatchFailed("no emotion".to_string()));
        };
        info!("[AVATAR {}] expression -> {}", action.id, emotion);
        completion.finish(CompletionOutcome::Finished);
        Ok(CompletionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn cancel(&self, _handle: CompletionHandle) -> Result<(), OutputError> {
        Ok(())
    }
}
