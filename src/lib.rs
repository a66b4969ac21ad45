pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    abandon_routine_impl, begin_routine_impl, complete_routine_impl, exit_routine_impl,
    get_routine_state_impl, list_templates_impl, plan_routine_impl, reset_routine_impl,
    start_routine_impl, toggle_task_impl,
};
use domain::error::EngineError;
use serde::Serialize;
use std::path::PathBuf;

pub use application::commands::{
    ActiveRoutineResponse, AppState, CommandFailure, RoutineStateResponse, TaskCountdownResponse,
};
pub use application::routine_engine::{NowProvider, RoutineEngine, RoutineState};
pub use domain::error::ErrorKind;
pub use domain::gate::{CompletionDecision, can_complete, evaluate_completion};
pub use domain::models::{Run, RunStatus, RunTask, TaskOffset, Template, TemplateTask};
pub use domain::progress::{
    Countdown, CountdownTone, can_finish, describe_countdown, next_required_task,
    progress_percent,
};
pub use domain::schedule::{
    ScheduleZone, canonical_order, end_time_input, project_target_time, resolve_end_instant,
    run_order,
};

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub database_path: String,
}

pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, CommandFailure> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| {
            startup_failure(EngineError::Persistence(error.to_string()))
        })?,
    };

    let result =
        bootstrap_workspace(&workspace_root).map_err(|error| startup_failure(error.into()))?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

fn startup_failure(error: EngineError) -> CommandFailure {
    CommandFailure {
        kind: error.kind(),
        message: error.to_string(),
    }
}

pub async fn list_templates(state: &AppState) -> Result<Vec<Template>, CommandFailure> {
    list_templates_impl(state)
        .await
        .map_err(|error| state.command_error("list_templates", &error))
}

pub async fn get_routine_state(state: &AppState) -> Result<RoutineStateResponse, CommandFailure> {
    get_routine_state_impl(state)
        .await
        .map_err(|error| state.command_error("get_routine_state", &error))
}

pub async fn start_routine(
    state: &AppState,
    template_id: String,
    end_time: Option<String>,
) -> Result<Option<Run>, CommandFailure> {
    start_routine_impl(state, template_id, end_time)
        .await
        .map_err(|error| state.command_error("start_routine", &error))
}

pub async fn plan_routine(
    state: &AppState,
    template_id: String,
    end_time: Option<String>,
) -> Result<Run, CommandFailure> {
    plan_routine_impl(state, template_id, end_time)
        .await
        .map_err(|error| state.command_error("plan_routine", &error))
}

pub async fn begin_routine(state: &AppState, run_id: String) -> Result<Run, CommandFailure> {
    begin_routine_impl(state, run_id)
        .await
        .map_err(|error| state.command_error("begin_routine", &error))
}

pub async fn toggle_task(
    state: &AppState,
    run_id: String,
    task_id: String,
    completed: bool,
) -> Result<RunTask, CommandFailure> {
    toggle_task_impl(state, run_id, task_id, completed)
        .await
        .map_err(|error| state.command_error("toggle_task", &error))
}

pub async fn complete_routine(state: &AppState, run_id: String) -> Result<Run, CommandFailure> {
    complete_routine_impl(state, run_id)
        .await
        .map_err(|error| state.command_error("complete_routine", &error))
}

pub async fn abandon_routine(state: &AppState, run_id: String) -> Result<Run, CommandFailure> {
    abandon_routine_impl(state, run_id)
        .await
        .map_err(|error| state.command_error("abandon_routine", &error))
}

pub async fn reset_routine(state: &AppState, run_id: String) -> Result<Run, CommandFailure> {
    reset_routine_impl(state, run_id)
        .await
        .map_err(|error| state.command_error("reset_routine", &error))
}

pub async fn exit_routine(state: &AppState) -> Result<Option<Run>, CommandFailure> {
    exit_routine_impl(state)
        .await
        .map_err(|error| state.command_error("exit_routine", &error))
}
