//! Output collaborators: speech playback and avatar control.
//!
//! The loop hands each collaborator an [`Action`] plus a [`Completion`] and
//! moves on. The collaborator reports back through the completion exactly
//! once; a completion dropped unreported counts as abandoned.

pub mod console;
pub mod say;

use tracing::warn;

use crate::decision::types::{Action, ActionId};
use crate::error::OutputError;
use crate::kernel::state::{CompletionOutcome, CompletionResult, StateHandle};

/// Identifies one `perform` call at the collaborator that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionHandle(pub u64);

pub trait OutputCollaborator: Send + Sync {
    fn name(&self) -> &str;

    /// Start performing `action`. Must not block on playback.
    fn perform(&self, action: &Action, completion: Completion)
        -> Result<CompletionHandle, OutputError>;

    /// Best-effort stop. The completion still fires, as `Cancelled` or
    /// whatever outcome won the race.
    fn cancel(&self, handle: CompletionHandle) -> Result<(), OutputError>;
}

/// One-shot completion callback bound to an action id.
#[derive(Debug)]
pub struct Completion {
    action_id: ActionId,
    state: Option<StateHandle>,
    reported: bool,
}

impl Completion {
    pub fn new(action_id: ActionId, state: StateHandle) -> Self {
        Self {
            action_id,
            state: Some(state),
            reported: false,
        }
    }

    /// For outputs whose end does not move the activity state (avatar).
    pub fn detached(action_id: ActionId) -> Self {
        Self {
            action_id,
            state: None,
            reported: false,
        }
    }

    pub fn action_id(&self) -> ActionId {
        self.action_id
    }

    /// `None` for detached completions.
    pub fn finish(mut self, outcome: CompletionOutcome) -> Option<CompletionResult> {
        self.report(outcome)
    }

    fn report(&mut self, outcome: CompletionOutcome) -> Option<CompletionResult> {
        self.reported = true;
        self.state
            .as_ref()
            .map(|state| state.complete(self.action_id, outcome))
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.reported {
            warn!("Completion for {} dropped unreported", self.action_id);
            self.report(CompletionOutcome::Abandoned);
        }
    }
}
