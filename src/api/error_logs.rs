use crate::{
    auth::auth::{AuthUser, MaybeAuthUser},
    error::ApiResult,
    model::error_log::{ErrorLevel, ErrorLog, ErrorSource},
    utils::{
        db_utils::{Filters, SqlValue, fetch_page},
        error_reporter::{self, ErrorEvent},
        pagination::{Page, PaginatedErrorLogs},
    },
    validation::FieldErrors,
};
use actix_web::{HttpRequest, HttpResponse, http::header, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

const MESSAGE_MAX_LEN: usize = 10_000;
const STACK_MAX_LEN: usize = 50_000;
const URL_MAX_LEN: usize = 2048;
const USER_AGENT_MAX_LEN: usize = 512;

#[derive(Deserialize, ToSchema)]
pub struct ReportErrorReq {
    /// Defaults to `frontend`
    pub source: Option<ErrorSource>,
    /// Defaults to `error`
    pub level: Option<ErrorLevel>,
    #[schema(example = "TypeError: cannot read properties of undefined")]
    pub message: String,
    pub stack: Option<String>,
    #[schema(example = "https://app.teamhub.io/timesheets")]
    pub url: Option<String>,
    /// Falls back to the request's User-Agent header
    pub user_agent: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub context: Option<Value>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ErrorLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub source: Option<ErrorSource>,
    pub level: Option<ErrorLevel>,
}

fn validate(body: &ReportErrorReq) -> ApiResult<()> {
    let mut errors = FieldErrors::default();
    errors.required("message", &body.message, MESSAGE_MAX_LEN);
    errors.optional_max_len("stack", body.stack.as_deref(), STACK_MAX_LEN);
    errors.optional_max_len("url", body.url.as_deref(), URL_MAX_LEN);
    errors.optional_max_len("user_agent", body.user_agent.as_deref(), USER_AGENT_MAX_LEN);
    errors.into_result()
}

/// Report a client or backend error
///
/// Open to anonymous callers; a valid bearer token attaches the user.
#[utoipa::path(
    post,
    path = "/api/errors",
    request_body = ReportErrorReq,
    responses(
        (status = 201, description = "Error stored", body = Object, example = json!({"id": 42})),
        (status = 400, description = "Validation failed")
    ),
    tag = "Errors"
)]
pub async fn report_error(
    req: HttpRequest,
    caller: MaybeAuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<ReportErrorReq>,
) -> ApiResult<HttpResponse> {
    validate(&body)?;

    let body = body.into_inner();
    let source = body.source.unwrap_or(ErrorSource::Frontend);
    let level = body.level.unwrap_or(ErrorLevel::Error);
    let user_id = caller.0.as_ref().map(|u| u.user_id);
    let user_agent = body.user_agent.or_else(|| {
        req.headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|ua| ua.chars().take(USER_AGENT_MAX_LEN).collect())
    });

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO error_logs (source, level, message, stack, url, user_agent, user_id, context)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(source.as_ref())
    .bind(level.as_ref())
    .bind(body.message.trim())
    .bind(&body.stack)
    .bind(&body.url)
    .bind(&user_agent)
    .bind(user_id)
    .bind(body.context.clone().map(Json))
    .fetch_one(pool.get_ref())
    .await?;

    match level {
        ErrorLevel::Fatal | ErrorLevel::Error => {
            error!(error_id = id, %source, user_id, message = %body.message.trim(), "Client error reported")
        }
        ErrorLevel::Warning => warn!(error_id = id, %source, user_id, message = %body.message.trim(), "Client warning reported"),
        ErrorLevel::Info | ErrorLevel::Debug => {
            info!(error_id = id, %source, user_id, message = %body.message.trim(), "Client message reported")
        }
    }

    if let Some(reporter) = error_reporter::global() {
        error_reporter::dispatch(ErrorEvent {
            source: source.to_string(),
            level: level.to_string(),
            message: body.message.trim().to_string(),
            stack: body.stack,
            url: body.url,
            user_id,
            environment: reporter.environment().to_string(),
            context: body.context,
            timestamp: Utc::now(),
        });
    }

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

/// List stored errors
#[utoipa::path(
    get,
    path = "/api/errors",
    params(ErrorLogQuery),
    responses(
        (status = 200, description = "Paginated error reports, newest first", body = PaginatedErrorLogs),
        (status = 403, description = "Forbidden")
    ),
    tag = "Errors",
    security(("bearer_auth" = []))
)]
pub async fn list_errors(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<ErrorLogQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(source) = query.source {
        filters.eq("source", SqlValue::String(source.to_string()));
    }
    if let Some(level) = query.level {
        filters.eq("level", SqlValue::String(level.to_string()));
    }

    let (logs, total) =
        fetch_page::<ErrorLog>(pool.get_ref(), "*", "error_logs", &filters, "created_at DESC, id DESC", page).await?;

    let body: PaginatedErrorLogs = page.wrap(logs, total);
    Ok(HttpResponse::Ok().json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(message: &str) -> ReportErrorReq {
        ReportErrorReq {
            source: None,
            level: None,
            message: message.to_string(),
            stack: None,
            url: None,
            user_agent: None,
            context: None,
        }
    }

    #[test]
    fn message_is_required_and_bounded() {
        assert!(validate(&report("boom")).is_ok());
        assert!(validate(&report("   ")).is_err());
        assert!(validate(&report(&"x".repeat(MESSAGE_MAX_LEN))).is_ok());
        assert!(validate(&report(&"x".repeat(MESSAGE_MAX_LEN + 1))).is_err());
    }

    #[test]
    fn report_body_uses_lowercase_enums() {
        let body: ReportErrorReq = serde_json::from_value(json!({
            "source": "backend",
            "level": "warning",
            "message": "slow query"
        }))
        .unwrap();
        assert_eq!(body.source, Some(ErrorSource::Backend));
        assert_eq!(body.level, Some(ErrorLevel::Warning));
    }
}
