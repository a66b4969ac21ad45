use crate::domain::models::{Run, RunTask};
use crate::domain::schedule::run_order;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_WARNING_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CountdownTone {
    Ok,
    Warning,
    Danger,
    Complete,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Countdown {
    pub label: String,
    pub tone: CountdownTone,
}

/// Countdown badge for a timed task. Flexible tasks have none.
pub fn describe_countdown(
    task: &RunTask,
    now: DateTime<Utc>,
    warning_minutes: i64,
) -> Option<Countdown> {
    let target = task.target_time?;
    if task.completed {
        return Some(Countdown {
            label: "Completed".to_string(),
            tone: CountdownTone::Complete,
        });
    }

    let remaining_millis = (target - now).num_milliseconds();
    // Whole minutes, rounded up.
    let remaining_minutes = remaining_millis.div_euclid(60_000)
        + i64::from(remaining_millis.rem_euclid(60_000) != 0);

    let countdown = if remaining_minutes > warning_minutes {
        Countdown {
            label: format!("{remaining_minutes} min left"),
            tone: CountdownTone::Ok,
        }
    } else if remaining_minutes > 0 {
        Countdown {
            label: format!("{remaining_minutes} min left"),
            tone: CountdownTone::Warning,
        }
    } else if remaining_minutes == 0 {
        Countdown {
            label: "Due now".to_string(),
            tone: CountdownTone::Warning,
        }
    } else {
        Countdown {
            label: format!("{} min overdue", remaining_minutes.abs()),
            tone: CountdownTone::Danger,
        }
    };
    Some(countdown)
}

pub fn progress_percent(run: &Run) -> u8 {
    if run.tasks.is_empty() {
        return 0;
    }
    let completed = run.tasks.iter().filter(|task| task.completed).count();
    ((completed as f64 / run.tasks.len() as f64) * 100.0).round() as u8
}

pub fn next_required_task(run: &Run) -> Option<&RunTask> {
    run_order(run)
        .iter()
        .find(|task| task.is_timed() && !task.completed)
}

/// Whether the finish action should be offered. The engine itself does not
/// require this before completing a run.
pub fn can_finish(run: &Run) -> bool {
    run.status.is_active() && run.tasks.iter().all(|task| task.completed)
}
