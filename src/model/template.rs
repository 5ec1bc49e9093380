use crate::model::role::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct OnboardingTemplate {
    pub id: i64,
    #[schema(example = "Engineering onboarding")]
    pub name: String,
    pub description: Option<String>,
    pub department_id: Option<i64>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct TemplateTask {
    pub id: i64,
    pub template_id: i64,
    #[schema(example = "Sign employment contract")]
    pub title: String,
    pub description: Option<String>,
    /// Days after the process start date when the task is due
    #[schema(example = 3)]
    pub due_offset_days: i32,
    #[sqlx(try_from = "String")]
    pub responsible_role: Role,
    pub sort_order: i32,
}
