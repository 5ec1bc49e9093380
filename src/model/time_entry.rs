use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

pub const MAX_HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl TryFrom<String> for ApprovalStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl ApprovalStatus {
    /// Only pending entries can be edited, deleted, approved or rejected.
    pub fn is_open(&self) -> bool {
        *self == ApprovalStatus::Pending
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 301,
    "user_id": 7,
    "project_id": 12,
    "task_id": null,
    "date": "2026-01-05",
    "hours": 7.5,
    "description": "Data mapping workshop",
    "billable": true,
    "status": "pending",
    "approved_by": null,
    "approved_at": null,
    "rejected_by": null,
    "rejected_at": null,
    "rejection_reason": null,
    "created_at": "2026-01-05T17:30:00Z",
    "updated_at": "2026-01-05T17:30:00Z"
}))]
pub struct TimeEntry {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub date: NaiveDate,
    pub hours: f64,
    pub description: Option<String>,
    pub billable: bool,
    #[sqlx(try_from = "String")]
    pub status: ApprovalStatus,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<i64>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hours must be positive and at most a full day.
pub fn hours_in_range(hours: f64) -> bool {
    hours.is_finite() && hours > 0.0 && hours <= MAX_HOURS_PER_DAY
}

/// Whether adding `hours` on top of what is already logged for the day stays within a day.
pub fn fits_in_day(already_logged: f64, hours: f64) -> bool {
    already_logged + hours <= MAX_HOURS_PER_DAY + f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_bounds() {
        assert!(hours_in_range(0.25));
        assert!(hours_in_range(24.0));
        assert!(!hours_in_range(0.0));
        assert!(!hours_in_range(-1.0));
        assert!(!hours_in_range(24.5));
        assert!(!hours_in_range(f64::NAN));
    }

    #[test]
    fn daily_total_is_capped() {
        assert!(fits_in_day(16.0, 8.0));
        assert!(!fits_in_day(16.5, 8.0));
        assert!(fits_in_day(0.0, 24.0));
    }

    #[test]
    fn only_pending_is_open() {
        assert!(ApprovalStatus::Pending.is_open());
        assert!(!ApprovalStatus::Approved.is_open());
        assert!(!ApprovalStatus::Rejected.is_open());
    }
}
