use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    #[schema(example = 2)]
    pub id: i64,
    #[schema(example = "Engineering")]
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
