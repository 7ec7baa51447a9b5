//! When the expiry sweep is due

use chrono::{DateTime, Local, Timelike};
use shared_enrol_config::TaskSettings;
use shared_enrol_store::TaskState;

/// Start of the schedule slot (minute) containing `now`
pub fn slot_start(now: &DateTime<Local>) -> DateTime<Local> {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*now)
}

/// Whether the sweep should run at `now`.
///
/// Runs at most once per slot, including across restarts, since the last
/// run time is persisted.
pub fn is_due(task: &TaskSettings, last: Option<&TaskState>, now: &DateTime<Local>) -> bool {
    if task.disabled || !task.schedule.matches(now) {
        return false;
    }

    match last {
        Some(state) => state.last_run < slot_start(now),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared_enrol_config::{SYNC_TASK_NAME, Schedule};

    fn at(minute: u32, second: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, 13, minute, second).unwrap()
    }

    fn state(last_run: DateTime<Local>) -> TaskState {
        TaskState {
            name: SYNC_TASK_NAME.into(),
            last_run,
            last_result: 0,
        }
    }

    #[test]
    fn test_due_on_schedule_only() {
        let task = TaskSettings::default();
        assert!(is_due(&task, None, &at(10, 5)));
        assert!(!is_due(&task, None, &at(11, 5)));
    }

    #[test]
    fn test_once_per_slot() {
        let task = TaskSettings::default();
        let ran = state(at(10, 3));

        assert!(!is_due(&task, Some(&ran), &at(10, 40)));
        assert!(is_due(&task, Some(&ran), &at(20, 0)));
        // A run from the previous hour does not block this slot
        let old = state(Local.with_ymd_and_hms(2025, 6, 2, 12, 10, 0).unwrap());
        assert!(is_due(&task, Some(&old), &at(10, 0)));
    }

    #[test]
    fn test_disabled_task_never_due() {
        let task = TaskSettings {
            disabled: true,
            ..Default::default()
        };
        assert!(!is_due(&task, None, &at(10, 0)));
    }

    #[test]
    fn test_custom_schedule() {
        let task = TaskSettings {
            schedule: Schedule::parse("15", "2", "*", "*", "*").unwrap(),
            ..Default::default()
        };
        assert!(!is_due(&task, None, &at(15, 0)));
        let night = Local.with_ymd_and_hms(2025, 6, 2, 2, 15, 0).unwrap();
        assert!(is_due(&task, None, &night));
    }

    #[test]
    fn test_slot_start_truncates_to_minute() {
        assert_eq!(slot_start(&at(10, 59)), at(10, 0));
    }
}
