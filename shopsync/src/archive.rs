//! Time-based demotion of completed tasks out of the active collection.

use chrono::{DateTime, TimeDelta, Utc};

use crate::records::{ArchivedTask, Task};

/// How long a done task stays on the board before it is archived.
pub fn default_retention() -> TimeDelta {
    TimeDelta::days(7)
}

/// Tasks split by a [`sweep`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sweep {
    pub active: Vec<Task>,
    pub archived: Vec<ArchivedTask>,
}

/// Move every done task completed more than `retention` before `now` into the
/// archived set, stamping `archived_at = now`.
///
/// Tasks that are not done, done tasks without a completion time, and done
/// tasks younger than the window stay active in their original order.
pub fn sweep(tasks: Vec<Task>, now: DateTime<Utc>, retention: TimeDelta) -> Sweep {
    let mut out = Sweep::default();
    for task in tasks {
        if qualifies(&task, now, retention) {
            out.archived.push(ArchivedTask::new(task, now));
        } else {
            out.active.push(task);
        }
    }
    out
}

fn qualifies(task: &Task, now: DateTime<Utc>, retention: TimeDelta) -> bool {
    match task.completed_at {
        Some(completed_at) if task.is_done() => now - completed_at > retention,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::DONE_STATUS;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap()
    }

    fn done_task(completed_at: DateTime<Utc>) -> Task {
        let mut task = Task::new("done job", DONE_STATUS, completed_at);
        task.completed_at = Some(completed_at);
        task
    }

    #[test]
    fn test_archival_boundary_is_strict() {
        let window = default_retention();
        let just_past = done_task(now() - window - TimeDelta::milliseconds(1));
        let just_inside = done_task(now() - window + TimeDelta::milliseconds(1));

        let out = sweep(vec![just_past.clone(), just_inside.clone()], now(), window);
        assert_eq!(out.archived.len(), 1);
        assert_eq!(out.archived[0].task.id, just_past.id);
        assert_eq!(out.active, vec![just_inside]);
    }

    #[test]
    fn test_one_aged_done_task_out_of_ten() {
        let mut tasks: Vec<Task> = (0..9)
            .map(|i| Task::new(format!("job {i}"), "todo", now() - TimeDelta::days(30)))
            .collect();
        let old = done_task(now() - TimeDelta::days(8));
        tasks.insert(4, old.clone());

        let out = sweep(tasks, now(), default_retention());
        assert_eq!(out.active.len(), 9);
        assert_eq!(out.archived.len(), 1);
        assert_eq!(out.archived[0].task, old);
        assert_eq!(out.archived[0].archived_at, now());
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let tasks = vec![
            done_task(now() - TimeDelta::days(10)),
            done_task(now() - TimeDelta::days(1)),
            Task::new("open", "inprogress", now()),
        ];
        let first = sweep(tasks, now(), default_retention());
        let second = sweep(first.active.clone(), now(), default_retention());
        assert!(second.archived.is_empty());
        assert_eq!(second.active, first.active);
    }

    #[test]
    fn test_non_done_and_unstamped_tasks_stay() {
        let mut stale_open = Task::new("old but open", "waiting", now() - TimeDelta::days(90));
        stale_open.completed_at = Some(now() - TimeDelta::days(90));
        let unstamped = Task::new("done, no date", DONE_STATUS, now() - TimeDelta::days(90));

        let out = sweep(vec![stale_open, unstamped], now(), default_retention());
        assert!(out.archived.is_empty());
        assert_eq!(out.active.len(), 2);
    }
}
