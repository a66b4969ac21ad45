use crate::domain::error::EngineError;
use crate::domain::ids::next_id;
use crate::domain::models::{Run, RunStatus, RunTask, Template, TemplateTask};
use crate::domain::schedule::{canonical_order, project_target_time};
use chrono::{DateTime, Utc};

pub fn instantiate_task(task: &TemplateTask, end_instant: DateTime<Utc>) -> RunTask {
    RunTask {
        id: next_id("rtk"),
        template_task_id: task.id.clone(),
        title: task.title.trim().to_string(),
        helper_text: task.helper_text.clone(),
        target_time: project_target_time(end_instant, task.offset),
        completed: false,
        completed_at: None,
    }
}

/// Builds an unsaved run for `template` ending at `end_instant`.
pub fn instantiate_run(
    template: &Template,
    end_instant: DateTime<Utc>,
    now: DateTime<Utc>,
    status: RunStatus,
) -> Result<Run, EngineError> {
    template.validate_for_run().map_err(EngineError::Validation)?;
    if status.is_terminal() {
        return Err(EngineError::InvalidTransition(format!(
            "a new run cannot start as {}",
            status.as_str()
        )));
    }

    let tasks = canonical_order(&template.tasks)
        .iter()
        .map(|task| instantiate_task(task, end_instant))
        .collect();

    Ok(Run {
        id: next_id("run"),
        template_id: template.id.clone(),
        name: template.name.trim().to_string(),
        end_time: end_instant,
        started_at: now,
        completed_at: None,
        canceled_at: None,
        status,
        tasks,
    })
}
