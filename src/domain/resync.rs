use crate::domain::error::EngineError;
use crate::domain::instantiate::instantiate_task;
use crate::domain::lifecycle::{RunEvent, transition};
use crate::domain::models::{Run, RunTask, Template};
use crate::domain::schedule::{canonical_order, project_target_time};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Rebuilds `run` against the current state of its template.
///
/// Tasks still present in the template keep their ids and are reset to
/// incomplete with recomputed targets. Tasks whose template entry is gone are
/// carried over untouched after the template-defined tasks.
pub fn resync_run(
    run: &Run,
    template: &Template,
    end_instant: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Run, EngineError> {
    let status = transition(run.status, RunEvent::Reset)?;
    template.validate_for_run().map_err(EngineError::Validation)?;
    if template.id != run.template_id {
        return Err(EngineError::Validation(format!(
            "run {} was started from template {}, not {}",
            run.id, run.template_id, template.id
        )));
    }

    let mut existing: HashMap<&str, &RunTask> = HashMap::new();
    for task in &run.tasks {
        existing.entry(task.template_task_id.as_str()).or_insert(task);
    }

    let mut reused = HashSet::new();
    let mut tasks = Vec::with_capacity(template.tasks.len());
    for template_task in canonical_order(&template.tasks) {
        let task = match existing.get(template_task.id.as_str()) {
            Some(current) => {
                reused.insert(current.id.clone());
                RunTask {
                    id: current.id.clone(),
                    template_task_id: template_task.id.clone(),
                    title: template_task.title.trim().to_string(),
                    helper_text: template_task.helper_text.clone(),
                    target_time: project_target_time(end_instant, template_task.offset),
                    completed: false,
                    completed_at: None,
                }
            }
            None => instantiate_task(&template_task, end_instant),
        };
        tasks.push(task);
    }

    tasks.extend(
        run.tasks
            .iter()
            .filter(|task| !reused.contains(&task.id))
            .cloned(),
    );

    Ok(Run {
        id: run.id.clone(),
        template_id: run.template_id.clone(),
        name: run.name.clone(),
        end_time: end_instant,
        started_at: now,
        completed_at: None,
        canceled_at: None,
        status,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instantiate::instantiate_run;
    use crate::domain::models::{RunStatus, TemplateTask};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn template_task(id: &str, offset: Option<u32>) -> TemplateTask {
        TemplateTask {
            id: id.to_string(),
            title: format!("task {id}"),
            helper_text: None,
            offset: offset.into(),
        }
    }

    fn template_with(tasks: Vec<TemplateTask>) -> Template {
        Template {
            id: "tpl-1".to_string(),
            name: "Evening Routine".to_string(),
            default_end_time: "20:30".to_string(),
            tasks,
        }
    }

    fn started_run() -> Run {
        let template = template_with(vec![
            template_task("a", Some(15)),
            template_task("b", Some(30)),
            template_task("c", None),
            template_task("z", Some(45)),
        ]);
        let mut run = instantiate_run(
            &template,
            fixed_time("2026-02-16T20:30:00Z"),
            fixed_time("2026-02-16T19:00:00Z"),
            RunStatus::InProgress,
        )
        .expect("instantiate run");
        let completed_at = fixed_time("2026-02-16T19:40:00Z");
        for task in &mut run.tasks {
            task.completed = true;
            task.completed_at = Some(completed_at);
        }
        run
    }

    fn updated_template() -> Template {
        template_with(vec![
            template_task("a", Some(15)),
            template_task("b", Some(30)),
            template_task("c", None),
            template_task("d", Some(5)),
        ])
    }

    fn ids_by_template_task(run: &Run) -> Vec<&str> {
        run.tasks
            .iter()
            .map(|task| task.template_task_id.as_str())
            .collect()
    }

    #[test]
    fn resync_resets_matching_tasks_and_adds_new_ones() {
        let run = started_run();
        let end = fixed_time("2026-02-16T21:00:00Z");
        let now = fixed_time("2026-02-16T19:50:00Z");
        let reset = resync_run(&run, &updated_template(), end, now).expect("resync");

        assert_eq!(ids_by_template_task(&reset), vec!["b", "a", "d", "c", "z"]);
        for template_task_id in ["a", "b", "c", "d"] {
            let task = reset
                .tasks
                .iter()
                .find(|task| task.template_task_id == template_task_id)
                .expect("template task present");
            assert!(!task.completed, "{template_task_id} should be reset");
            assert_eq!(task.completed_at, None);
        }
        let b = &reset.tasks[0];
        assert_eq!(b.target_time, Some(fixed_time("2026-02-16T20:30:00Z")));
        let d = &reset.tasks[2];
        assert_eq!(d.target_time, Some(fixed_time("2026-02-16T20:55:00Z")));
        assert_eq!(reset.end_time, end);
        assert_eq!(reset.started_at, now);
        assert_eq!(reset.status, RunStatus::InProgress);
    }

    #[test]
    fn resync_keeps_run_task_identity() {
        let run = started_run();
        let reset = resync_run(
            &run,
            &updated_template(),
            run.end_time,
            fixed_time("2026-02-16T19:50:00Z"),
        )
        .expect("resync");

        for template_task_id in ["a", "b", "c"] {
            let before = run
                .tasks
                .iter()
                .find(|task| task.template_task_id == template_task_id)
                .expect("before");
            let after = reset
                .tasks
                .iter()
                .find(|task| task.template_task_id == template_task_id)
                .expect("after");
            assert_eq!(before.id, after.id);
        }
    }

    // Removed template tasks are never pruned: they stay in the run exactly as they were.
    #[test]
    fn resync_preserves_tasks_removed_from_template() {
        let run = started_run();
        let before = run
            .tasks
            .iter()
            .find(|task| task.template_task_id == "z")
            .cloned()
            .expect("z exists before reset");

        let reset = resync_run(
            &run,
            &updated_template(),
            fixed_time("2026-02-16T21:00:00Z"),
            fixed_time("2026-02-16T19:50:00Z"),
        )
        .expect("resync");
        let after = reset.tasks.last().expect("leftover task");

        assert_eq!(after, &before);
        assert!(after.completed);
        assert_eq!(after.target_time, Some(fixed_time("2026-02-16T19:45:00Z")));
    }

    #[test]
    fn resync_is_idempotent_apart_from_timestamps() {
        let run = started_run();
        let template = updated_template();
        let end = fixed_time("2026-02-16T21:00:00Z");
        let first = resync_run(&run, &template, end, fixed_time("2026-02-16T19:50:00Z"))
            .expect("first resync");
        let second = resync_run(&first, &template, end, fixed_time("2026-02-16T19:55:00Z"))
            .expect("second resync");

        assert_eq!(first.tasks, second.tasks);
        assert_eq!(first.end_time, second.end_time);
        assert_eq!(second.started_at, fixed_time("2026-02-16T19:55:00Z"));
    }

    #[test]
    fn resync_rejects_terminal_run() {
        for status in [RunStatus::Completed, RunStatus::Abandoned] {
            let mut run = started_run();
            run.status = status;
            run.completed_at = Some(fixed_time("2026-02-16T20:00:00Z"));
            run.canceled_at = Some(fixed_time("2026-02-16T20:00:00Z"));
            let error = resync_run(&run, &updated_template(), run.end_time, run.end_time)
                .expect_err("terminal run");
            assert!(matches!(error, EngineError::InvalidTransition(_)));
        }
    }

    #[test]
    fn resync_moves_planned_run_into_progress() {
        let mut run = started_run();
        run.status = RunStatus::Planned;
        let reset = resync_run(&run, &updated_template(), run.end_time, run.end_time)
            .expect("resync planned run");
        assert_eq!(reset.status, RunStatus::InProgress);
    }

    #[test]
    fn resync_rejects_foreign_template() {
        let run = started_run();
        let mut template = updated_template();
        template.id = "tpl-other".to_string();
        let error =
            resync_run(&run, &template, run.end_time, run.end_time).expect_err("foreign template");
        assert!(matches!(error, EngineError::Validation(_)));
    }
}
