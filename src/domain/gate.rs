use crate::domain::error::EngineError;
use crate::domain::lifecycle::{RunEvent, transition};
use crate::domain::models::Run;
use crate::domain::schedule::run_order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDecision {
    Allowed,
    /// The task is already in the requested state.
    Unchanged,
    RunTerminal,
    UnknownTask,
    Blocked { blocking_task_id: String },
}

impl CompletionDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Self::Allowed | Self::Unchanged)
    }
}

/// Decides whether `task_id` may be set to `desired_completed`.
///
/// Predecessors are the tasks ahead of it in [`run_order`].
pub fn evaluate_completion(
    run: &Run,
    task_id: &str,
    desired_completed: bool,
) -> CompletionDecision {
    if transition(run.status, RunEvent::ToggleTask).is_err() {
        return CompletionDecision::RunTerminal;
    }
    let ordered = run_order(run);
    let Some(position) = ordered.iter().position(|task| task.id == task_id) else {
        return CompletionDecision::UnknownTask;
    };

    let task = &ordered[position];
    if task.completed == desired_completed {
        return CompletionDecision::Unchanged;
    }
    if !desired_completed || !task.is_timed() {
        return CompletionDecision::Allowed;
    }

    match ordered[..position]
        .iter()
        .find(|candidate| candidate.is_timed() && !candidate.completed)
    {
        Some(blocking) => CompletionDecision::Blocked {
            blocking_task_id: blocking.id.clone(),
        },
        None => CompletionDecision::Allowed,
    }
}

pub fn can_complete(run: &Run, task_id: &str, desired_completed: bool) -> bool {
    evaluate_completion(run, task_id, desired_completed).is_permitted()
}

/// Maps a decision onto the engine's error kinds. `Ok(false)` means nothing
/// needs to be written.
pub fn ensure_completion_allowed(
    run: &Run,
    task_id: &str,
    desired_completed: bool,
) -> Result<bool, EngineError> {
    match evaluate_completion(run, task_id, desired_completed) {
        CompletionDecision::Allowed => Ok(true),
        CompletionDecision::Unchanged => Ok(false),
        CompletionDecision::RunTerminal => Err(EngineError::InvalidTransition(format!(
            "run {} is {} and no longer accepts task changes",
            run.id,
            run.status.as_str()
        ))),
        CompletionDecision::UnknownTask => Err(EngineError::Validation(format!(
            "task {task_id} does not belong to run {}",
            run.id
        ))),
        CompletionDecision::Blocked { blocking_task_id } => {
            let blocking_title = run
                .task(&blocking_task_id)
                .map(|task| task.title.as_str())
                .unwrap_or(blocking_task_id.as_str());
            Err(EngineError::OrderingViolation(format!(
                "'{blocking_title}' must be completed before task {task_id}"
            )))
        }
    }
}
