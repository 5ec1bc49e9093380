use crate::model::role::Role;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TryFrom<String> for ProcessStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl ProcessStatus {
    pub fn can_transition_to(&self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ProcessStatus::Completed | ProcessStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct OnboardingProcess {
    pub id: i64,
    pub template_id: i64,
    pub employee_id: i64,
    #[sqlx(try_from = "String")]
    pub status: ProcessStatus,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub created_by: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ProcessTask {
    pub id: i64,
    pub process_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub responsible_role: Role,
    pub sort_order: i32,
    pub completed: bool,
    pub completed_by: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Due date of a task that is due `offset_days` after `start`.
pub fn due_date_for(start: NaiveDate, offset_days: i32) -> NaiveDate {
    start
        .checked_add_days(Days::new(offset_days.max(0) as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// A process is due when its last task is due; a template with no tasks is due on day one.
pub fn process_due_date(start: NaiveDate, offsets: &[i32]) -> NaiveDate {
    let max_offset = offsets.iter().copied().max().unwrap_or(0);
    due_date_for(start, max_offset)
}

/// Percentage of completed tasks, rounded down; 0 for an empty process.
pub fn progress_percent(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (completed.clamp(0, total) * 100) / total
    }
}

/// Status a process moves to once `completed` of its `total` tasks are done.
pub fn status_after_task_completion(current: ProcessStatus, completed: i64, total: i64) -> ProcessStatus {
    if current.is_closed() {
        return current;
    }
    if total > 0 && completed >= total {
        ProcessStatus::Completed
    } else {
        ProcessStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessStatus::*;
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn due_dates_follow_offsets() {
        let start = date(2026, 1, 29);
        assert_eq!(due_date_for(start, 0), start);
        assert_eq!(due_date_for(start, 5), date(2026, 2, 3));
        assert_eq!(due_date_for(start, -3), start);
        assert_eq!(process_due_date(start, &[1, 14, 3]), date(2026, 2, 12));
        assert_eq!(process_due_date(start, &[]), start);
    }

    #[test]
    fn progress_rounds_down() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(5, 3), 100);
    }

    #[test]
    fn completing_tasks_drives_the_status() {
        assert_eq!(status_after_task_completion(Pending, 1, 4), InProgress);
        assert_eq!(status_after_task_completion(InProgress, 3, 4), InProgress);
        assert_eq!(status_after_task_completion(InProgress, 4, 4), Completed);
        assert_eq!(status_after_task_completion(Pending, 1, 1), Completed);
        assert_eq!(status_after_task_completion(Cancelled, 4, 4), Cancelled);
    }

    #[test]
    fn process_transitions() {
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(InProgress));
    }
}
