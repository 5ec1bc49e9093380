use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    #[schema(example = "time_entry.approve")]
    pub action: String,
    #[schema(example = "time_entry")]
    pub entity_type: String,
    pub entity_id: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<Json<Value>>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}
