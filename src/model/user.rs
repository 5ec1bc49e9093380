use crate::model::role::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Full `users` row, including credentials. Never serialized directly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub department_id: Option<i64>,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection of a user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "email": "ana.garcia@teamhub.io",
    "first_name": "Ana",
    "last_name": "Garcia",
    "role": "rrhh",
    "department_id": 2,
    "is_active": true,
    "mfa_enabled": false,
    "last_login_at": "2026-01-05T09:12:00Z",
    "created_at": "2025-11-01T08:00:00Z"
}))]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub department_id: Option<i64>,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            role: u.role,
            department_id: u.department_id,
            is_active: u.is_active,
            mfa_enabled: u.mfa_enabled,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

pub const USER_PROFILE_COLUMNS: &str = "id, email, first_name, last_name, role, department_id, \
     is_active, mfa_enabled, last_login_at, created_at";
