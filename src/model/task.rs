use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
    Cancelled,
}

impl TryFrom<String> for TaskStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TaskStatus {
    pub const NAMES: &'static [&'static str] = &["todo", "in_progress", "review", "done", "cancelled"];

    pub fn is_open(&self) -> bool {
        !matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub const NAMES: &'static [&'static str] = &["low", "medium", "high", "urgent"];
}

impl TryFrom<String> for TaskPriority {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    #[schema(example = "Prepare laptop image")]
    pub title: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,
    pub assignee_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_progress_uses_snake_case_everywhere() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            TaskStatus::try_from("in_progress".to_string()).unwrap(),
            TaskStatus::InProgress
        );
    }

    #[test]
    fn names_parse_back() {
        for name in TaskStatus::NAMES {
            assert_eq!(TaskStatus::try_from(name.to_string()).unwrap().to_string(), *name);
        }
        for name in TaskPriority::NAMES {
            assert_eq!(TaskPriority::try_from(name.to_string()).unwrap().to_string(), *name);
        }
    }

    #[test]
    fn done_and_cancelled_are_closed() {
        assert!(TaskStatus::Todo.is_open());
        assert!(TaskStatus::Review.is_open());
        assert!(!TaskStatus::Done.is_open());
        assert!(!TaskStatus::Cancelled.is_open());
    }
}
