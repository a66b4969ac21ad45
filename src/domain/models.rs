use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Anchor of a task relative to the routine's end time.
///
/// Stored and serialized as an optional non-negative minute count so that a
/// missing value, `null` and a number all collapse into one representation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum TaskOffset {
    #[default]
    Flexible,
    Minutes(u32),
}

impl TaskOffset {
    pub fn minutes(self) -> Option<u32> {
        match self {
            Self::Flexible => None,
            Self::Minutes(minutes) => Some(minutes),
        }
    }

    pub fn is_timed(self) -> bool {
        matches!(self, Self::Minutes(_))
    }
}

impl From<Option<u32>> for TaskOffset {
    fn from(value: Option<u32>) -> Self {
        value.map(Self::Minutes).unwrap_or(Self::Flexible)
    }
}

impl From<TaskOffset> for Option<u32> {
    fn from(value: TaskOffset) -> Self {
        value.minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateTask {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    #[serde(default, rename = "targetOffsetMinutes")]
    pub offset: TaskOffset,
}

impl TemplateTask {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "template.tasks[].id")?;
        validate_non_empty(&self.title, "template.tasks[].title")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub default_end_time: String,
    #[serde(default)]
    pub tasks: Vec<TemplateTask>,
}

impl Template {
    /// Full check applied when templates are loaded from config.
    pub fn validate(&self) -> Result<(), String> {
        validate_hhmm(&self.default_end_time, "template.default_end_time")?;
        self.validate_for_run()
    }

    /// What building a run needs. The default end time is not consulted
    /// because callers pass the end time explicitly.
    pub fn validate_for_run(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "template.id")?;
        validate_non_empty(&self.name, "template.name")?;
        let mut seen = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(format!("template.tasks[].id '{}' is duplicated", task.id));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planned,
    InProgress,
    Completed,
    Abandoned,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "planned" => Some(Self::Planned),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTask {
    pub id: String,
    pub template_task_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    pub target_time: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunTask {
    pub fn is_timed(&self) -> bool {
        self.target_time.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "run.tasks[].id")?;
        validate_non_empty(&self.title, "run.tasks[].title")?;
        if self.completed != self.completed_at.is_some() {
            return Err(format!(
                "run.tasks[].completed_at must be set exactly when task '{}' is completed",
                self.id
            ));
        }
        Ok(())
    }
}

/// Flag plus stamp written by a single task toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCompletion {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskCompletion {
    pub fn at(completed: bool, now: DateTime<Utc>) -> Self {
        Self {
            completed,
            completed_at: completed.then_some(now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub id: String,
    pub template_id: String,
    pub name: String,
    pub end_time: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub tasks: Vec<RunTask>,
}

impl Run {
    pub fn task(&self, task_id: &str) -> Option<&RunTask> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    pub fn position(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == task_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "run.id")?;
        validate_non_empty(&self.name, "run.name")?;
        let mut seen = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(format!("run.tasks[].id '{}' is duplicated", task.id));
            }
        }
        if self.status == RunStatus::Completed && self.completed_at.is_none() {
            return Err("run.completed_at must be set for a completed run".to_string());
        }
        if self.status == RunStatus::Abandoned && self.canceled_at.is_none() {
            return Err("run.canceled_at must be set for an abandoned run".to_string());
        }
        Ok(())
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    parse_hhmm(value)
        .map(|_| ())
        .ok_or_else(|| format!("{field_name} must be HH:MM"))
}

/// Parses a wall-clock `H:MM`/`HH:MM` string. Seconds are not accepted.
pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let mut split = value.trim().split(':');
    let hour_str = split.next()?;
    let minute_str = split.next()?;
    if split.next().is_some() {
        return None;
    }
    if hour_str.is_empty() || hour_str.len() > 2 || minute_str.len() != 2 {
        return None;
    }

    let hour = hour_str.parse::<u32>().ok()?;
    let minute = minute_str.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}
