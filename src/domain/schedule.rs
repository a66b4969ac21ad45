use crate::domain::error::EngineError;
use crate::domain::models::{Run, RunTask, TaskOffset, TemplateTask, parse_hhmm};
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::cmp::{Ordering, Reverse};

/// Zone whose calendar date "today" is taken from when an end time is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScheduleZone {
    #[default]
    SystemLocal,
    Named(Tz),
}

impl ScheduleZone {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("local") {
            return Some(Self::SystemLocal);
        }
        value.parse::<Tz>().ok().map(Self::Named)
    }
}

pub fn parse_end_time(value: &str) -> Result<NaiveTime, EngineError> {
    parse_hhmm(value).ok_or_else(|| {
        EngineError::Validation(format!("end time must be HH:MM (got '{}')", value.trim()))
    })
}

/// Combines `end_time` with today's date in `zone`.
///
/// The date is never rolled forward, so an end time that already passed today
/// still resolves to today.
pub fn resolve_end_instant(
    end_time: &str,
    now: DateTime<Utc>,
    zone: ScheduleZone,
) -> Result<DateTime<Utc>, EngineError> {
    let time = parse_end_time(end_time)?;
    match zone {
        ScheduleZone::SystemLocal => localize(&Local, now, time),
        ScheduleZone::Named(tz) => localize(&tz, now, time),
    }
}

fn localize<Z: TimeZone>(
    zone: &Z,
    now: DateTime<Utc>,
    time: NaiveTime,
) -> Result<DateTime<Utc>, EngineError> {
    let today = now.with_timezone(zone).date_naive();
    zone.from_local_datetime(&today.and_time(time))
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| {
            EngineError::Validation(format!(
                "end time {} does not exist on {today} in the configured timezone",
                time.format("%H:%M")
            ))
        })
}

/// Wall-clock `HH:MM` of `instant` in `zone`.
pub fn end_time_input(instant: DateTime<Utc>, zone: ScheduleZone) -> String {
    match zone {
        ScheduleZone::SystemLocal => instant.with_timezone(&Local).format("%H:%M").to_string(),
        ScheduleZone::Named(tz) => instant.with_timezone(&tz).format("%H:%M").to_string(),
    }
}

pub fn project_target_time(
    end_instant: DateTime<Utc>,
    offset: TaskOffset,
) -> Option<DateTime<Utc>> {
    offset
        .minutes()
        .map(|minutes| end_instant - Duration::minutes(i64::from(minutes)))
}

/// Anything that can be placed on the routine's timeline.
///
/// `None` marks a flexible entry. Smaller keys come first.
pub trait Scheduled {
    type Key: Ord;

    fn schedule_key(&self) -> Option<Self::Key>;
}

impl Scheduled for TemplateTask {
    type Key = Reverse<u32>;

    fn schedule_key(&self) -> Option<Self::Key> {
        self.offset.minutes().map(Reverse)
    }
}

/// Timed entries chronologically, flexible entries trailing in input order.
pub fn canonical_order<T>(tasks: &[T]) -> Vec<T>
where
    T: Scheduled + Clone,
{
    let mut ordered = tasks.to_vec();
    ordered.sort_by(compare_schedule);
    ordered
}

/// Display and gating order of a run's tasks: the order they were stored in.
///
/// Instantiation and resync store template tasks in canonical order, with
/// tasks whose template entry was removed trailing behind them. Re-sorting by
/// target time would move those leftovers ahead of the tasks the gate checks
/// first.
pub fn run_order(run: &Run) -> &[RunTask] {
    &run.tasks
}

fn compare_schedule<T: Scheduled>(left: &T, right: &T) -> Ordering {
    match (left.schedule_key(), right.schedule_key()) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn utc_zone() -> ScheduleZone {
        ScheduleZone::Named(chrono_tz::UTC)
    }

    fn template_task(id: &str, offset: Option<u32>) -> TemplateTask {
        TemplateTask {
            id: id.to_string(),
            title: format!("task {id}"),
            helper_text: None,
            offset: offset.into(),
        }
    }

    #[test]
    fn project_target_time_subtracts_offset() {
        let end = fixed_time("2026-02-16T20:30:00Z");
        assert_eq!(
            project_target_time(end, TaskOffset::Minutes(30)),
            Some(fixed_time("2026-02-16T20:00:00Z"))
        );
        assert_eq!(project_target_time(end, TaskOffset::Minutes(0)), Some(end));
        assert_eq!(project_target_time(end, TaskOffset::Flexible), None);
    }

    #[test]
    fn resolve_end_instant_uses_today_in_zone() {
        let now = fixed_time("2026-02-16T18:00:00Z");
        let end = resolve_end_instant("20:30", now, utc_zone()).expect("resolve end time");
        assert_eq!(end, fixed_time("2026-02-16T20:30:00Z"));

        let tokyo = ScheduleZone::parse("Asia/Tokyo").expect("known zone");
        let end = resolve_end_instant("20:30", now, tokyo).expect("resolve tokyo end time");
        // 18:00Z is 03:00 on the 17th in Tokyo.
        assert_eq!(end, fixed_time("2026-02-17T11:30:00Z"));
    }

    // Known limitation: an end time that already passed today stays on today's date.
    #[test]
    fn resolve_end_instant_does_not_roll_over_past_times() {
        let now = fixed_time("2026-02-16T22:00:00Z");
        let end = resolve_end_instant("20:30", now, utc_zone()).expect("resolve end time");
        assert_eq!(end, fixed_time("2026-02-16T20:30:00Z"));
        assert!(end < now);
    }

    #[test]
    fn resolve_end_instant_rejects_malformed_time() {
        let now = fixed_time("2026-02-16T18:00:00Z");
        let error = resolve_end_instant("25:00", now, utc_zone()).expect_err("invalid hour");
        assert!(matches!(error, EngineError::Validation(_)));
    }

    #[test]
    fn resolve_end_instant_rejects_time_in_dst_gap() {
        // 2026-03-08 02:30 does not exist in New York.
        let zone = ScheduleZone::parse("America/New_York").expect("known zone");
        let now = fixed_time("2026-03-08T12:00:00Z");
        let error = resolve_end_instant("02:30", now, zone).expect_err("time in DST gap");
        assert!(matches!(error, EngineError::Validation(_)));
    }

    #[test]
    fn end_time_input_roundtrips_resolved_instant() {
        let now = fixed_time("2026-02-16T18:00:00Z");
        let zone = ScheduleZone::parse("Europe/Berlin").expect("known zone");
        let end = resolve_end_instant("08:05", now, zone).expect("resolve end time");
        assert_eq!(end_time_input(end, zone), "08:05");
    }

    #[test]
    fn schedule_zone_parse_handles_local_and_unknown() {
        assert_eq!(ScheduleZone::parse("local"), Some(ScheduleZone::SystemLocal));
        assert_eq!(ScheduleZone::parse(""), Some(ScheduleZone::SystemLocal));
        assert_eq!(ScheduleZone::parse("Mars/Olympus"), None);
    }

    #[test]
    fn canonical_order_places_larger_offsets_first_and_flexible_last() {
        let tasks = vec![
            template_task("a", Some(15)),
            template_task("b", Some(30)),
            template_task("c", None),
        ];
        let ordered = canonical_order(&tasks);
        let ids = ordered.iter().map(|task| task.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn canonical_order_keeps_flexible_input_order() {
        let tasks = vec![
            template_task("x", None),
            template_task("a", Some(5)),
            template_task("y", None),
            template_task("z", None),
        ];
        let ordered = canonical_order(&tasks);
        let ids = ordered.iter().map(|task| task.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "x", "y", "z"]);
    }

    fn offsets_strategy() -> impl Strategy<Value = Vec<Option<u32>>> {
        prop::collection::vec(prop::option::of(0u32..240u32), 0..16)
    }

    fn build_tasks(offsets: &[Option<u32>]) -> Vec<TemplateTask> {
        offsets
            .iter()
            .enumerate()
            .map(|(index, offset)| template_task(&format!("t{index}"), *offset))
            .collect()
    }

    proptest! {
        #[test]
        fn canonical_order_is_idempotent(offsets in offsets_strategy()) {
            let tasks = build_tasks(&offsets);
            let once = canonical_order(&tasks);
            let twice = canonical_order(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn canonical_order_never_places_flexible_before_timed(offsets in offsets_strategy()) {
            let ordered = canonical_order(&build_tasks(&offsets));
            let first_flexible = ordered.iter().position(|task| !task.offset.is_timed());
            if let Some(first_flexible) = first_flexible {
                prop_assert!(ordered[first_flexible..].iter().all(|task| !task.offset.is_timed()));
            }
            let timed = ordered
                .iter()
                .filter_map(|task| task.offset.minutes())
                .collect::<Vec<_>>();
            prop_assert!(timed.windows(2).all(|pair| pair[0] >= pair[1]));
        }
    }
}
