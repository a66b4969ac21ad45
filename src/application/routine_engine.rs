use crate::domain::error::EngineError;
use crate::domain::gate::ensure_completion_allowed;
use crate::domain::instantiate::instantiate_run;
use crate::domain::lifecycle::{RunEvent, transition};
use crate::domain::models::{Run, RunStatus, RunTask, TaskCompletion, Template};
use crate::domain::resync::resync_run;
use crate::domain::schedule::{ScheduleZone, resolve_end_instant};
use crate::infrastructure::run_repository::RunRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoutineState {
    pub active: Option<Run>,
    pub completed: Vec<Run>,
}

/// Drives runs through instantiation, gated task toggles, lifecycle
/// transitions and resync. Every mutating call re-reads the run from the
/// repository first and returns what the repository holds afterwards.
pub struct RoutineEngine<R>
where
    R: RunRepository,
{
    repository: Arc<R>,
    now_provider: NowProvider,
    zone: ScheduleZone,
}

impl<R> RoutineEngine<R>
where
    R: RunRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            now_provider: Arc::new(Utc::now),
            zone: ScheduleZone::default(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_time_zone(mut self, zone: ScheduleZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn zone(&self) -> ScheduleZone {
        self.zone
    }

    /// Starts an in-progress run. Without a template nothing happens.
    pub async fn start_run(
        &self,
        template: Option<&Template>,
        end_time: &str,
    ) -> Result<Option<Run>, EngineError> {
        let Some(template) = template else {
            return Ok(None);
        };
        self.create_run(template, end_time, RunStatus::InProgress)
            .await
            .map(Some)
    }

    pub async fn plan_run(&self, template: &Template, end_time: &str) -> Result<Run, EngineError> {
        self.create_run(template, end_time, RunStatus::Planned).await
    }

    pub async fn begin_run(&self, run_id: &str) -> Result<Run, EngineError> {
        self.apply_status_event(run_id, RunEvent::Begin).await
    }

    pub async fn complete_run(&self, run_id: &str) -> Result<Run, EngineError> {
        self.apply_status_event(run_id, RunEvent::Complete).await
    }

    pub async fn abandon_run(&self, run_id: &str) -> Result<Run, EngineError> {
        self.apply_status_event(run_id, RunEvent::Abandon).await
    }

    pub async fn set_task_completed(
        &self,
        run_id: &str,
        task_id: &str,
        completed: bool,
    ) -> Result<RunTask, EngineError> {
        let run = self.load_run(run_id).await?;
        if !ensure_completion_allowed(&run, task_id, completed)? {
            return run.task(task_id).cloned().ok_or_else(|| {
                EngineError::Validation(format!("task {task_id} does not belong to run {run_id}"))
            });
        }

        let completion = TaskCompletion::at(completed, (self.now_provider)());
        let task = self
            .repository
            .update_run_task(task_id, completion)
            .await?;
        tracing::debug!(run_id, task_id, completed, "routine task toggled");
        Ok(task)
    }

    /// Rebuilds the run from `template` against a freshly chosen end time.
    pub async fn reset_run(
        &self,
        run_id: &str,
        template: &Template,
        end_time: &str,
    ) -> Result<Run, EngineError> {
        let run = self.load_run(run_id).await?;
        let now = (self.now_provider)();
        let end_instant = resolve_end_instant(end_time, now, self.zone)?;
        let reset = resync_run(&run, template, end_instant, now)?;
        let stored = self.persist_run(&reset).await?;
        tracing::info!(
            run_id,
            template_id = %template.id,
            tasks = stored.tasks.len(),
            "routine run reset"
        );
        Ok(stored)
    }

    pub async fn routine_state(&self, history_limit: usize) -> Result<RoutineState, EngineError> {
        let active = self.repository.read_active_run().await?;
        let completed = self.repository.read_completed_runs(history_limit).await?;
        Ok(RoutineState { active, completed })
    }

    async fn create_run(
        &self,
        template: &Template,
        end_time: &str,
        status: RunStatus,
    ) -> Result<Run, EngineError> {
        let now = (self.now_provider)();
        let end_instant = resolve_end_instant(end_time, now, self.zone)?;
        let run = instantiate_run(template, end_instant, now, status)?;

        if let Some(active) = self.repository.read_active_run().await? {
            return Err(EngineError::InvalidTransition(format!(
                "run {} is still {}; finish or abandon it first",
                active.id,
                active.status.as_str()
            )));
        }

        let stored = self.persist_run(&run).await?;
        tracing::info!(
            run_id = %stored.id,
            template_id = %template.id,
            status = stored.status.as_str(),
            end_time = %stored.end_time,
            "routine run created"
        );
        Ok(stored)
    }

    async fn apply_status_event(&self, run_id: &str, event: RunEvent) -> Result<Run, EngineError> {
        let run = self.load_run(run_id).await?;
        let status = transition(run.status, event)?;
        self.repository
            .update_run_status(run_id, status, (self.now_provider)())
            .await?;
        tracing::info!(
            run_id,
            event = event.as_str(),
            status = status.as_str(),
            "routine run transitioned"
        );
        self.load_run(run_id).await
    }

    pub async fn load_run(&self, run_id: &str) -> Result<Run, EngineError> {
        self.repository
            .read_run(run_id)
            .await?
            .ok_or_else(|| EngineError::Validation(format!("run {run_id} does not exist")))
    }

    async fn persist_run(&self, run: &Run) -> Result<Run, EngineError> {
        let stored = self.repository.write_run(run).await?;
        let stored_ids = stored
            .tasks
            .iter()
            .map(|task| task.id.as_str())
            .collect::<HashSet<_>>();
        let missing = run
            .tasks
            .iter()
            .filter(|task| !stored_ids.contains(task.id.as_str()))
            .count();
        if missing > 0 {
            tracing::error!(run_id = %run.id, missing, "routine run write came back short");
            return Err(EngineError::Persistence(format!(
                "partial write: run {} is missing {missing} of {} tasks",
                run.id,
                run.tasks.len()
            )));
        }
        Ok(stored)
    }
}
