use crate::{
    auth::auth::AuthUser,
    error::ApiResult,
    model::audit_log::AuditLog,
    utils::{
        db_utils::{Filters, SqlValue, fetch_page},
        pagination::{Page, PaginatedAuditLogs},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::PgPool;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub user_id: Option<i64>,
    #[param(example = "time_entry")]
    pub entity_type: Option<String>,
    #[param(example = "time_entry.approve")]
    pub action: Option<String>,
}

/// Read the audit trail
#[utoipa::path(
    get,
    path = "/api/audit-logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Paginated audit entries, newest first", body = PaginatedAuditLogs),
        (status = 403, description = "Forbidden")
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<AuditLogQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(user_id) = query.user_id {
        filters.eq("user_id", SqlValue::I64(user_id));
    }
    if let Some(entity_type) = query.entity_type.as_deref().filter(|s| !s.is_empty()) {
        filters.eq("entity_type", SqlValue::String(entity_type.to_string()));
    }
    if let Some(action) = query.action.as_deref().filter(|s| !s.is_empty()) {
        filters.eq("action", SqlValue::String(action.to_string()));
    }

    let (entries, total) =
        fetch_page::<AuditLog>(pool.get_ref(), "*", "audit_logs", &filters, "created_at DESC, id DESC", page).await?;

    let body: PaginatedAuditLogs = page.wrap(entries, total);
    Ok(HttpResponse::Ok().json(body))
}
