use crate::domain::models::{Run, RunStatus, RunTask, TaskCompletion};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{
    decode_optional_timestamp, decode_timestamp, encode_timestamp, open_connection,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn read_active_run(&self) -> Result<Option<Run>, InfraError>;
    /// Most recently completed runs first.
    async fn read_completed_runs(&self, limit: usize) -> Result<Vec<Run>, InfraError>;
    async fn read_run(&self, run_id: &str) -> Result<Option<Run>, InfraError>;
    /// Inserts or replaces the run together with its full task list and
    /// returns what was persisted.
    async fn write_run(&self, run: &Run) -> Result<Run, InfraError>;
    async fn update_run_task(
        &self,
        task_id: &str,
        completion: TaskCompletion,
    ) -> Result<RunTask, InfraError>;
    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), InfraError>;
}

const RUN_COLUMNS: &str =
    "id, template_id, name, target_end_time, started_at, completed_at, canceled_at, status";
const TASK_COLUMNS: &str =
    "id, template_task_id, title, helper_text, target_time, completed_at";

#[derive(Debug, Clone)]
pub struct SqliteRunRepository {
    db_path: PathBuf,
}

impl SqliteRunRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    fn load_run(connection: &Connection, run_id: &str) -> Result<Option<Run>, InfraError> {
        let row = connection
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM routine_runs WHERE id = ?1"),
                params![run_id],
                StoredRun::from_row,
            )
            .optional()?;
        row.map(|stored| stored.into_run(connection)).transpose()
    }

    fn load_runs(
        connection: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Run>, InfraError> {
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params, StoredRun::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|stored| stored.into_run(connection))
            .collect()
    }

    fn load_tasks(connection: &Connection, run_id: &str) -> Result<Vec<RunTask>, InfraError> {
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM routine_run_tasks WHERE run_id = ?1 ORDER BY position ASC"
        ))?;
        let rows = statement
            .query_map(params![run_id], StoredTask::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StoredTask::into_task).collect()
    }
}

struct StoredRun {
    id: String,
    template_id: String,
    name: String,
    target_end_time: String,
    started_at: String,
    completed_at: Option<String>,
    canceled_at: Option<String>,
    status: String,
}

impl StoredRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            template_id: row.get(1)?,
            name: row.get(2)?,
            target_end_time: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            canceled_at: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_run(self, connection: &Connection) -> Result<Run, InfraError> {
        let status = RunStatus::parse(&self.status).ok_or_else(|| {
            InfraError::InvalidRecord(format!(
                "run {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        let tasks = SqliteRunRepository::load_tasks(connection, &self.id)?;
        Ok(Run {
            end_time: decode_timestamp(&self.target_end_time, "target_end_time")?,
            started_at: decode_timestamp(&self.started_at, "started_at")?,
            completed_at: decode_optional_timestamp(self.completed_at, "completed_at")?,
            canceled_at: decode_optional_timestamp(self.canceled_at, "canceled_at")?,
            id: self.id,
            template_id: self.template_id,
            name: self.name,
            status,
            tasks,
        })
    }
}

struct StoredTask {
    id: String,
    template_task_id: String,
    title: String,
    helper_text: Option<String>,
    target_time: Option<String>,
    completed_at: Option<String>,
}

impl StoredTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            template_task_id: row.get(1)?,
            title: row.get(2)?,
            helper_text: row.get(3)?,
            target_time: row.get(4)?,
            completed_at: row.get(5)?,
        })
    }

    fn into_task(self) -> Result<RunTask, InfraError> {
        let completed_at = decode_optional_timestamp(self.completed_at, "completed_at")?;
        Ok(RunTask {
            id: self.id,
            template_task_id: self.template_task_id,
            title: self.title,
            helper_text: self.helper_text,
            target_time: decode_optional_timestamp(self.target_time, "target_time")?,
            completed: completed_at.is_some(),
            completed_at,
        })
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn read_active_run(&self) -> Result<Option<Run>, InfraError> {
        let connection = self.connect()?;
        let runs = Self::load_runs(
            &connection,
            &format!(
                "SELECT {RUN_COLUMNS} FROM routine_runs
                 WHERE status IN ('planned', 'in_progress')
                 ORDER BY started_at DESC
                 LIMIT 1"
            ),
            [],
        )?;
        Ok(runs.into_iter().next())
    }

    async fn read_completed_runs(&self, limit: usize) -> Result<Vec<Run>, InfraError> {
        let connection = self.connect()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Self::load_runs(
            &connection,
            &format!(
                "SELECT {RUN_COLUMNS} FROM routine_runs
                 WHERE status = 'completed'
                 ORDER BY completed_at DESC
                 LIMIT ?1"
            ),
            params![limit],
        )
    }

    async fn read_run(&self, run_id: &str) -> Result<Option<Run>, InfraError> {
        let connection = self.connect()?;
        Self::load_run(&connection, run_id)
    }

    async fn write_run(&self, run: &Run) -> Result<Run, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;

        if run.status.is_active() {
            let other_active: Option<String> = transaction
                .query_row(
                    "SELECT id FROM routine_runs
                     WHERE status IN ('planned', 'in_progress') AND id <> ?1
                     LIMIT 1",
                    params![run.id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(active_id) = other_active {
                return Err(InfraError::ActiveRunConflict(active_id));
            }
        }

        transaction.execute(
            "INSERT INTO routine_runs
               (id, template_id, name, target_end_time, started_at, completed_at, canceled_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               template_id = excluded.template_id,
               name = excluded.name,
               target_end_time = excluded.target_end_time,
               started_at = excluded.started_at,
               completed_at = excluded.completed_at,
               canceled_at = excluded.canceled_at,
               status = excluded.status",
            params![
                run.id,
                run.template_id,
                run.name,
                encode_timestamp(run.end_time),
                encode_timestamp(run.started_at),
                run.completed_at.map(encode_timestamp),
                run.canceled_at.map(encode_timestamp),
                run.status.as_str(),
            ],
        )?;

        transaction.execute(
            "DELETE FROM routine_run_tasks WHERE run_id = ?1",
            params![run.id],
        )?;
        {
            let mut insert = transaction.prepare(
                "INSERT INTO routine_run_tasks
                   (id, run_id, template_task_id, title, helper_text, target_time, completed_at, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (position, task) in run.tasks.iter().enumerate() {
                insert.execute(params![
                    task.id,
                    run.id,
                    task.template_task_id,
                    task.title,
                    task.helper_text,
                    task.target_time.map(encode_timestamp),
                    task.completed_at.map(encode_timestamp),
                    position as i64,
                ])?;
            }
        }
        transaction.commit()?;

        Self::load_run(&connection, &run.id)?
            .ok_or_else(|| InfraError::NotFound(format!("run {} after write", run.id)))
    }

    async fn update_run_task(
        &self,
        task_id: &str,
        completion: TaskCompletion,
    ) -> Result<RunTask, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE routine_run_tasks SET completed_at = ?1 WHERE id = ?2",
            params![completion.completed_at.map(encode_timestamp), task_id],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("run task {task_id}")));
        }

        let stored = connection.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM routine_run_tasks WHERE id = ?1"),
            params![task_id],
            StoredTask::from_row,
        )?;
        stored.into_task()
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let stamp_column = match status {
            RunStatus::Completed => Some("completed_at"),
            RunStatus::Abandoned => Some("canceled_at"),
            RunStatus::InProgress => Some("started_at"),
            RunStatus::Planned => None,
        };
        let connection = self.connect()?;
        let changed = match stamp_column {
            Some(column) => connection.execute(
                &format!("UPDATE routine_runs SET status = ?1, {column} = ?2 WHERE id = ?3"),
                params![status.as_str(), encode_timestamp(timestamp), run_id],
            )?,
            None => connection.execute(
                "UPDATE routine_runs SET status = ?1 WHERE id = ?2",
                params![status.as_str(), run_id],
            )?,
        };
        if changed == 0 {
            return Err(InfraError::NotFound(format!("run {run_id}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<Vec<Run>>,
}

impl InMemoryRunRepository {
    fn lock(&self) -> Result<MutexGuard<'_, Vec<Run>>, InfraError> {
        self.runs
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("run store: {error}")))
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn read_active_run(&self) -> Result<Option<Run>, InfraError> {
        let runs = self.lock()?;
        Ok(runs
            .iter()
            .filter(|run| run.status.is_active())
            .max_by_key(|run| run.started_at)
            .cloned())
    }

    async fn read_completed_runs(&self, limit: usize) -> Result<Vec<Run>, InfraError> {
        let runs = self.lock()?;
        let mut completed = runs
            .iter()
            .filter(|run| run.status == RunStatus::Completed)
            .cloned()
            .collect::<Vec<_>>();
        completed.sort_by(|left, right| right.completed_at.cmp(&left.completed_at));
        completed.truncate(limit);
        Ok(completed)
    }

    async fn read_run(&self, run_id: &str) -> Result<Option<Run>, InfraError> {
        let runs = self.lock()?;
        Ok(runs.iter().find(|run| run.id == run_id).cloned())
    }

    async fn write_run(&self, run: &Run) -> Result<Run, InfraError> {
        let mut runs = self.lock()?;
        if run.status.is_active() {
            if let Some(active) = runs
                .iter()
                .find(|stored| stored.id != run.id && stored.status.is_active())
            {
                return Err(InfraError::ActiveRunConflict(active.id.clone()));
            }
        }
        match runs.iter_mut().find(|stored| stored.id == run.id) {
            Some(stored) => *stored = run.clone(),
            None => runs.push(run.clone()),
        }
        Ok(run.clone())
    }

    async fn update_run_task(
        &self,
        task_id: &str,
        completion: TaskCompletion,
    ) -> Result<RunTask, InfraError> {
        let mut runs = self.lock()?;
        let task = runs
            .iter_mut()
            .flat_map(|run| run.tasks.iter_mut())
            .find(|task| task.id == task_id)
            .ok_or_else(|| InfraError::NotFound(format!("run task {task_id}")))?;
        task.completed = completion.completed;
        task.completed_at = completion.completed_at;
        Ok(task.clone())
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut runs = self.lock()?;
        let run = runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or_else(|| InfraError::NotFound(format!("run {run_id}")))?;
        run.status = status;
        match status {
            RunStatus::Completed => run.completed_at = Some(timestamp),
            RunStatus::Abandoned => run.canceled_at = Some(timestamp),
            RunStatus::InProgress => run.started_at = timestamp,
            RunStatus::Planned => {}
        }
        Ok(())
    }
}
