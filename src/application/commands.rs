use crate::application::bootstrap::bootstrap_workspace;
use crate::application::routine_engine::RoutineEngine;
use crate::domain::error::{EngineError, ErrorKind};
use crate::domain::models::{Run, RunTask, Template};
use crate::domain::progress::{
    Countdown, can_finish, describe_countdown, next_required_task, progress_percent,
};
use crate::domain::schedule::end_time_input;
use crate::infrastructure::config::{
    read_countdown_warning_minutes, read_history_limit, read_timezone,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::run_repository::SqliteRunRepository;
use crate::infrastructure::template_repository::{JsonTemplateRepository, TemplateRepository};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    engine: RoutineEngine<SqliteRunRepository>,
    templates: JsonTemplateRepository,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let zone = read_timezone(&bootstrap.config_dir)?;
        let repository = Arc::new(SqliteRunRepository::new(&bootstrap.database_path));

        Ok(Self {
            engine: RoutineEngine::new(repository).with_time_zone(zone),
            templates: JsonTemplateRepository::new(&bootstrap.config_dir),
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn engine(&self) -> &RoutineEngine<SqliteRunRepository> {
        &self.engine
    }

    pub fn command_error(&self, command: &str, error: &EngineError) -> CommandFailure {
        self.log_error(command, &error.to_string());
        CommandFailure {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    async fn template(&self, template_id: &str) -> Result<Option<Template>, EngineError> {
        Ok(self.templates.read_template(template_id).await?)
    }
}

/// Error payload handed back to the UI layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskCountdownResponse {
    pub task_id: String,
    #[serde(flatten)]
    pub countdown: Countdown,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActiveRoutineResponse {
    pub run: Run,
    pub end_time_input: String,
    pub progress_percent: u8,
    pub can_finish: bool,
    pub next_required_task_id: Option<String>,
    pub countdowns: Vec<TaskCountdownResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoutineStateResponse {
    pub active: Option<ActiveRoutineResponse>,
    pub completed: Vec<Run>,
}

pub async fn list_templates_impl(state: &AppState) -> Result<Vec<Template>, EngineError> {
    let templates = state.templates.read_templates().await?;
    Ok(templates)
}

pub async fn get_routine_state_impl(state: &AppState) -> Result<RoutineStateResponse, EngineError> {
    let history_limit = read_history_limit(state.config_dir())?;
    let warning_minutes = read_countdown_warning_minutes(state.config_dir())?;
    let routine_state = state.engine.routine_state(history_limit).await?;
    let now = Utc::now();

    let active = routine_state.active.map(|run| {
        let countdowns = run
            .tasks
            .iter()
            .filter_map(|task| {
                describe_countdown(task, now, warning_minutes).map(|countdown| {
                    TaskCountdownResponse {
                        task_id: task.id.clone(),
                        countdown,
                    }
                })
            })
            .collect();
        ActiveRoutineResponse {
            end_time_input: end_time_input(run.end_time, state.engine.zone()),
            progress_percent: progress_percent(&run),
            can_finish: can_finish(&run),
            next_required_task_id: next_required_task(&run).map(|task| task.id.clone()),
            countdowns,
            run,
        }
    });

    Ok(RoutineStateResponse {
        active,
        completed: routine_state.completed,
    })
}

/// Starts a run from a configured template. An unknown template id is a
/// no-op and returns `None`; `end_time` defaults to the template's own.
pub async fn start_routine_impl(
    state: &AppState,
    template_id: String,
    end_time: Option<String>,
) -> Result<Option<Run>, EngineError> {
    let template = state.template(template_id.trim()).await?;
    let end_time = end_time
        .or_else(|| template.as_ref().map(|template| template.default_end_time.clone()))
        .unwrap_or_default();
    let run = state.engine.start_run(template.as_ref(), &end_time).await?;
    match &run {
        Some(run) => state.log_info(
            "start_routine",
            &format!(
                "started run_id={} template_id={} end_time={}",
                run.id,
                run.template_id,
                run.end_time.to_rfc3339()
            ),
        ),
        None => state.log_info(
            "start_routine",
            &format!("template_id={template_id} not found; nothing started"),
        ),
    }
    Ok(run)
}

pub async fn plan_routine_impl(
    state: &AppState,
    template_id: String,
    end_time: Option<String>,
) -> Result<Run, EngineError> {
    let template = state
        .template(template_id.trim())
        .await?
        .ok_or_else(|| EngineError::Validation(format!("template {template_id} does not exist")))?;
    let end_time = end_time.unwrap_or_else(|| template.default_end_time.clone());
    let run = state.engine.plan_run(&template, &end_time).await?;
    state.log_info("plan_routine", &format!("planned run_id={}", run.id));
    Ok(run)
}

pub async fn begin_routine_impl(state: &AppState, run_id: String) -> Result<Run, EngineError> {
    let run = state.engine.begin_run(&run_id).await?;
    state.log_info("begin_routine", &format!("began run_id={run_id}"));
    Ok(run)
}

pub async fn toggle_task_impl(
    state: &AppState,
    run_id: String,
    task_id: String,
    completed: bool,
) -> Result<RunTask, EngineError> {
    let task = state
        .engine
        .set_task_completed(&run_id, &task_id, completed)
        .await?;
    state.log_info(
        "toggle_task",
        &format!("run_id={run_id} task_id={task_id} completed={}", task.completed),
    );
    Ok(task)
}

pub async fn complete_routine_impl(state: &AppState, run_id: String) -> Result<Run, EngineError> {
    let run = state.engine.complete_run(&run_id).await?;
    state.log_info("complete_routine", &format!("completed run_id={run_id}"));
    Ok(run)
}

pub async fn abandon_routine_impl(state: &AppState, run_id: String) -> Result<Run, EngineError> {
    let run = state.engine.abandon_run(&run_id).await?;
    state.log_info("abandon_routine", &format!("abandoned run_id={run_id}"));
    Ok(run)
}

/// Resyncs a run with the current version of its template, keeping the run's
/// own end time.
pub async fn reset_routine_impl(state: &AppState, run_id: String) -> Result<Run, EngineError> {
    let run = state.engine.load_run(&run_id).await?;
    let template = state.template(&run.template_id).await?.ok_or_else(|| {
        EngineError::Validation(format!(
            "template {} for run {run_id} no longer exists",
            run.template_id
        ))
    })?;
    let end_time = end_time_input(run.end_time, state.engine.zone());
    let reset = state.engine.reset_run(&run_id, &template, &end_time).await?;
    state.log_info(
        "reset_routine",
        &format!("reset run_id={run_id} end_time={end_time} tasks={}", reset.tasks.len()),
    );
    Ok(reset)
}

/// Leaves the routine screen. An active run is abandoned; otherwise this is a
/// no-op returning `None`.
pub async fn exit_routine_impl(state: &AppState) -> Result<Option<Run>, EngineError> {
    let history_limit = read_history_limit(state.config_dir())?;
    let Some(active) = state.engine.routine_state(history_limit).await?.active else {
        return Ok(None);
    };
    let abandoned = state.engine.abandon_run(&active.id).await?;
    state.log_info("exit_routine", &format!("abandoned run_id={}", abandoned.id));
    Ok(Some(abandoned))
}
