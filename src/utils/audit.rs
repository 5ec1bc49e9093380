use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::error;

use crate::auth::auth::AuthUser;

/// One append-only audit record.
#[derive(Debug)]
pub struct AuditEntry<'a> {
    pub user_id: Option<i64>,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<i64>,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
}

impl<'a> AuditEntry<'a> {
    pub fn new(action: &'a str, entity_type: &'a str, entity_id: Option<i64>) -> Self {
        Self {
            user_id: None,
            action,
            entity_type,
            entity_id,
            details: None,
            ip_address: None,
        }
    }

    pub fn by(mut self, auth: &AuthUser) -> Self {
        self.user_id = Some(auth.user_id);
        self.ip_address = auth.ip.clone();
        self
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

/// Writes the entry. A failure is logged and swallowed: auditing never fails a request.
pub async fn record(pool: &PgPool, entry: AuditEntry<'_>) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs (user_id, action, entity_type, entity_id, details, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.details.map(Json))
    .bind(&entry.ip_address)
    .execute(pool)
    .await;

    if let Err(e) = result {
        error!(error = %e, action = entry.action, "Failed to write audit log");
    }
}
