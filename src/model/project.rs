use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl TryFrom<String> for ProjectStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl ProjectStatus {
    pub const NAMES: &'static [&'static str] = &["planning", "active", "paused", "completed", "cancelled"];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;

        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Planning, Active)
                | (Planning, Cancelled)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Cancelled)
                | (Paused, Active)
                | (Paused, Cancelled)
        )
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Project {
    #[schema(example = 12)]
    pub id: i64,
    #[schema(example = "Payroll migration")]
    pub name: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ProjectStatus,
    pub manager_id: Option<i64>,
    pub department_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ProjectStatus::*;
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn terminal_states_cannot_move() {
        for next in ProjectStatus::iter().filter(|s| *s != Completed) {
            assert!(!Completed.can_transition_to(next));
        }
        for next in ProjectStatus::iter().filter(|s| *s != Cancelled) {
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn lifecycle_edges() {
        assert!(Planning.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(!Planning.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Planning));
    }

    #[test]
    fn names_cover_every_status() {
        let names: Vec<String> = ProjectStatus::iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ProjectStatus::NAMES);
    }

    #[test]
    fn parses_snake_case() {
        assert_eq!(ProjectStatus::try_from("paused".to_string()).unwrap(), Paused);
        assert_eq!(Planning.to_string(), "planning");
    }
}
