use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorSource {
    Frontend,
    Backend,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl TryFrom<String> for ErrorSource {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for ErrorLevel {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, <ErrorLevel as TryFrom<String>>::Error> {
        value.parse()
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ErrorLog {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub source: ErrorSource,
    #[sqlx(try_from = "String")]
    pub level: ErrorLevel,
    pub message: String,
    pub stack: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub context: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
}
