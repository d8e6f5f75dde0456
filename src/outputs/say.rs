use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{Completion, CompletionHandle, OutputCollaborator};
use crate::decision::types::Action;
use crate::error::OutputError;
use crate::kernel::state::CompletionOutcome;

type Stoppers = Arc<Mutex<HashMap<u64, oneshot::Sender<()>>>>;

fn lock(stoppers: &Stoppers) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<()>>> {
    stoppers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Speaks through the system `say` command. Cancel kills the process.
#[derive(Debug)]
pub struct SayVoice {
    program: String,
    next_handle: AtomicU64,
    stoppers: Stoppers,
}

impl Default for SayVoice {
    fn default() -> Self {
        Self::new("say")
    }
}

impl SayVoice {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            next_handle: AtomicU64::new(0),
            stoppers: Arc::default(),
        }
    }
}

impl OutputCollaborator for SayVoice {
    fn name(&self) -> &str {
        "say-voice"
    }

    fn perform(
        &self,
        action: &Action,
        completion: Completion,
    ) -> Result<CompletionHandle, OutputError> {
        let text = action
            .text
            .as_deref()
            .ok_or_else(|| OutputError::DispatchFailed("speech without text".to_string()))?;

        let mut child = Command::new(&self.program)
            .arg(text)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OutputError::DispatchFailed(format!("failed to spawn '{}': {}", self.program, e)))?;
        info!("[VOICE {}] spawned '{}': '{}'", action.id, self.program, text);

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        lock(&self.stoppers).insert(handle, stop_tx);

        let stoppers = Arc::clone(&self.stoppers);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => CompletionOutcome::Finished,
                    Ok(status) => {
                        warn!("Speech process exited with {}", status);
                        CompletionOutcome::Failed
                    }
                    Err(e) => {
                        warn!("Speech process wait failed: {}", e);
                        CompletionOutcome::Failed
                    }
                },
                _ = &mut stop_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill speech process: {}", e);
                    }
                    CompletionOutcome::Cancelled
                }
            };
            lock(&stoppers).remove(&handle);
            completion.finish(outcome);
        });

        Ok(CompletionHandle(handle))
    }

    fn cancel(&self, handle: CompletionHandle) -> Result<(), OutputError> {
        let stopper = lock(&self.stoppers).remove(&handle.0);
        match stopper {
            // Receiver gone means playback already ended.
            Some(stop_tx) => {
                let _ = stop_tx.send(());
                Ok(())
            }
            None => Err(OutputError::UnknownHandle(handle.0)),
        }
    }
}
