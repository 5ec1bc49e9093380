use crate::{
    api::projects::load_project,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        project::ProjectStatus,
        role::Role,
        time_entry::{ApprovalStatus, MAX_HOURS_PER_DAY, TimeEntry, fits_in_day, hours_in_range},
    },
    utils::{
        audit::{self, AuditEntry},
        db_utils::{Column, ColumnKind, Filters, SqlValue, as_object, build_update_sql, fetch_page, fetch_updated},
        pagination::{Page, PaginatedTimeEntries},
    },
    validation::FieldErrors,
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

const DESCRIPTION_MAX_LEN: usize = 1000;
const REASON_MAX_LEN: usize = 500;

#[derive(Deserialize, ToSchema)]
pub struct CreateTimeEntryReq {
    #[schema(example = 12)]
    pub project_id: i64,
    pub task_id: Option<i64>,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = 7.5)]
    pub hours: f64,
    pub description: Option<String>,
    /// Defaults to true
    pub billable: Option<bool>,
}

/// Editable fields of a pending entry; `null` clears `task_id` or `description`.
const UPDATABLE_COLUMNS: &[Column] = &[
    Column::nullable("task_id", ColumnKind::BigInt),
    Column::required("date", ColumnKind::Date),
    Column::required("hours", ColumnKind::Float),
    Column::nullable("description", ColumnKind::Text),
    Column::required("billable", ColumnKind::Bool),
];

/// Entry fields after applying the payload on top of the stored row.
#[derive(Debug, PartialEq)]
struct MergedEntry {
    date: NaiveDate,
    hours: f64,
    description: Option<String>,
    task_id: Option<i64>,
}

fn merge_update(obj: &Map<String, Value>, entry: &TimeEntry) -> MergedEntry {
    MergedEntry {
        date: obj
            .get("date")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .unwrap_or(entry.date),
        hours: obj.get("hours").and_then(Value::as_f64).unwrap_or(entry.hours),
        description: match obj.get("description") {
            Some(v) => v.as_str().map(|s| s.trim().to_string()),
            None => entry.description.clone(),
        },
        task_id: match obj.get("task_id") {
            Some(v) => v.as_i64(),
            None => entry.task_id,
        },
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RejectReq {
    #[schema(example = "Hours belong to the support project")]
    pub reason: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimeEntryListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub user_id: Option<i64>,
    pub project_id: Option<i64>,
    pub status: Option<ApprovalStatus>,
    /// Inclusive lower bound (YYYY-MM-DD)
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound (YYYY-MM-DD)
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Defaults to the caller
    pub user_id: Option<i64>,
    /// Defaults to the first day of the current month
    pub from: Option<NaiveDate>,
    /// Defaults to today
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TimeSummary {
    pub user_id: i64,
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub entries: i64,
    pub total_hours: f64,
    pub billable_hours: f64,
    pub pending_hours: f64,
    pub approved_hours: f64,
    pub rejected_hours: f64,
}

/// Field checks shared by create and update.
fn validate_entry(date: NaiveDate, hours: f64, description: Option<&str>, today: NaiveDate) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if !hours_in_range(hours) {
        errors.add("hours", format!("Hours must be greater than 0 and at most {MAX_HOURS_PER_DAY}"));
    }
    if date > today {
        errors.add("date", "Cannot log time in the future");
    }
    errors.optional_max_len("description", description, DESCRIPTION_MAX_LEN);

    errors
}

/// Reviewers are admin/rrhh or the project's manager, never the entry's owner.
fn ensure_can_review(auth: &AuthUser, entry_owner: i64, project_manager: Option<i64>) -> ApiResult<()> {
    if entry_owner == auth.user_id {
        return Err(ApiError::forbidden("You cannot review your own time entries"));
    }
    if auth.is_hr_staff() || (auth.role == Role::Manager && project_manager == Some(auth.user_id)) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only HR, admins or the project manager can review this entry"))
    }
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

/// Scopes a listing to what the caller may see.
fn visibility_filter(auth: &AuthUser, filters: &mut Filters) {
    match auth.role {
        Role::Admin | Role::Rrhh => {}
        Role::Manager => filters.push(
            "(te.user_id = ? OR p.manager_id = ?)",
            [SqlValue::I64(auth.user_id), SqlValue::I64(auth.user_id)],
        ),
        Role::Employee => filters.eq("te.user_id", SqlValue::I64(auth.user_id)),
    }
}

async fn load_entry(pool: &PgPool, entry_id: i64) -> ApiResult<TimeEntry> {
    sqlx::query_as::<_, TimeEntry>("SELECT * FROM time_entries WHERE id = $1")
        .bind(entry_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Time entry not found"))
}

/// Hours already logged by a user on a day, rejected entries excluded.
/// Takes a per-user advisory lock so concurrent submissions are serialized.
async fn logged_hours(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    date: NaiveDate,
    exclude_entry: Option<i64>,
) -> Result<f64, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(hours), 0)::DOUBLE PRECISION
        FROM time_entries
        WHERE user_id = $1 AND date = $2 AND status <> 'rejected'
          AND ($3::BIGINT IS NULL OR id <> $3)
        "#,
    )
    .bind(user_id)
    .bind(date)
    .bind(exclude_entry)
    .fetch_one(&mut **tx)
    .await
}

async fn ensure_task_in_project(pool: &PgPool, task_id: Option<i64>, project_id: i64) -> ApiResult<()> {
    let Some(task_id) = task_id else {
        return Ok(());
    };

    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM tasks WHERE id = $1 AND project_id = $2")
        .bind(task_id)
        .bind(project_id)
        .fetch_optional(pool)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => {
            let mut errors = FieldErrors::default();
            errors.add("task_id", "Task does not belong to the project");
            errors.into_result()
        }
    }
}

/// Log time
#[utoipa::path(
    post,
    path = "/api/time-entries",
    request_body = CreateTimeEntryReq,
    responses(
        (status = 201, description = "Entry created in pending state", body = TimeEntry),
        (status = 400, description = "Validation failed, project not active or daily limit exceeded"),
        (status = 404, description = "Project not found")
    ),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn create_time_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<CreateTimeEntryReq>,
) -> ApiResult<HttpResponse> {
    let today = Utc::now().date_naive();
    validate_entry(body.date, body.hours, body.description.as_deref(), today).into_result()?;

    let project = load_project(pool.get_ref(), body.project_id).await?;
    if project.status != ProjectStatus::Active {
        return Err(ApiError::bad_request(format!(
            "Time can only be logged on active projects (project is {})",
            project.status
        )));
    }
    ensure_task_in_project(pool.get_ref(), body.task_id, project.id).await?;

    let mut tx = pool.begin().await?;

    let already = logged_hours(&mut tx, auth.user_id, body.date, None).await?;
    if !fits_in_day(already, body.hours) {
        warn!(user_id = auth.user_id, date = %body.date, already, requested = body.hours, "Daily hours exceeded");
        return Err(ApiError::bad_request(format!(
            "Daily limit exceeded: {already} h already logged on {}",
            body.date
        )));
    }

    let entry = sqlx::query_as::<_, TimeEntry>(
        r#"
        INSERT INTO time_entries (user_id, project_id, task_id, date, hours, description, billable)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(project.id)
    .bind(body.task_id)
    .bind(body.date)
    .bind(body.hours)
    .bind(&body.description)
    .bind(body.billable.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(entry_id = entry.id, user_id = auth.user_id, hours = entry.hours, "Time entry created");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("time_entry.create", "time_entry", Some(entry.id))
            .by(&auth)
            .details(json!({ "project_id": entry.project_id, "date": entry.date, "hours": entry.hours })),
    )
    .await;

    Ok(HttpResponse::Created().json(entry))
}

/// List time entries visible to the caller
#[utoipa::path(
    get,
    path = "/api/time-entries",
    params(TimeEntryListQuery),
    responses((status = 200, description = "Paginated entries", body = PaginatedTimeEntries)),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn list_time_entries(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<TimeEntryListQuery>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.date_order("to", query.from, query.to);
    errors.into_result()?;

    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    visibility_filter(&auth, &mut filters);

    if let Some(user_id) = query.user_id {
        filters.eq("te.user_id", SqlValue::I64(user_id));
    }
    if let Some(project_id) = query.project_id {
        filters.eq("te.project_id", SqlValue::I64(project_id));
    }
    if let Some(status) = query.status {
        filters.eq("te.status", SqlValue::String(status.to_string()));
    }
    if let Some(from) = query.from {
        filters.push("te.date >= ?", [SqlValue::Date(from)]);
    }
    if let Some(to) = query.to {
        filters.push("te.date <= ?", [SqlValue::Date(to)]);
    }

    let (entries, total) = fetch_page::<TimeEntry>(
        pool.get_ref(),
        "te.*",
        "time_entries te JOIN projects p ON p.id = te.project_id",
        &filters,
        "te.date DESC, te.id DESC",
        page,
    )
    .await?;

    let body: PaginatedTimeEntries = page.wrap(entries, total);
    Ok(HttpResponse::Ok().json(body))
}

/// Edit a pending entry
#[utoipa::path(
    put,
    path = "/api/time-entries/{entry_id}",
    params(("entry_id", Path, description = "Time entry ID")),
    request_body(content = Object, example = json!({"hours": 6.5, "description": null})),
    responses(
        (status = 200, description = "Entry updated", body = TimeEntry),
        (status = 400, description = "Validation failed or entry already reviewed"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Entry not found")
    ),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn update_time_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let entry_id = path.into_inner();
    let update = build_update_sql("time_entries", &body, UPDATABLE_COLUMNS, entry_id)?;
    let entry = load_entry(pool.get_ref(), entry_id).await?;

    if entry.user_id != auth.user_id {
        return Err(ApiError::forbidden("You can only edit your own time entries"));
    }
    if !entry.status.is_open() {
        return Err(ApiError::bad_request(format!("Entry is already {}", entry.status)));
    }

    let MergedEntry {
        date,
        hours,
        description,
        task_id,
    } = merge_update(as_object(&body)?, &entry);

    validate_entry(date, hours, description.as_deref(), Utc::now().date_naive()).into_result()?;
    ensure_task_in_project(pool.get_ref(), task_id, entry.project_id).await?;

    let mut tx = pool.begin().await?;

    let already = logged_hours(&mut tx, auth.user_id, date, Some(entry_id)).await?;
    if !fits_in_day(already, hours) {
        return Err(ApiError::bad_request(format!(
            "Daily limit exceeded: {already} h already logged on {date}"
        )));
    }

    let updated = fetch_updated::<_, TimeEntry>(&mut *tx, update.guarded_returning("status = 'pending'"))
        .await?
        .ok_or_else(|| ApiError::conflict("Entry was reviewed in the meantime"))?;

    tx.commit().await?;

    debug!(entry_id, "Time entry updated");
    audit::record(pool.get_ref(), AuditEntry::new("time_entry.update", "time_entry", Some(entry_id)).by(&auth)).await;

    Ok(HttpResponse::Ok().json(updated))
}

/// Delete a pending entry
#[utoipa::path(
    delete,
    path = "/api/time-entries/{entry_id}",
    params(("entry_id", Path, description = "Time entry ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Entry already reviewed"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Entry not found")
    ),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn delete_time_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let entry_id = path.into_inner();
    let entry = load_entry(pool.get_ref(), entry_id).await?;

    if entry.user_id != auth.user_id {
        return Err(ApiError::forbidden("You can only delete your own time entries"));
    }
    if !entry.status.is_open() {
        return Err(ApiError::bad_request(format!("Entry is already {}", entry.status)));
    }

    let result = sqlx::query("DELETE FROM time_entries WHERE id = $1 AND status = 'pending'")
        .bind(entry_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Entry was reviewed in the meantime"));
    }

    audit::record(pool.get_ref(), AuditEntry::new("time_entry.delete", "time_entry", Some(entry_id)).by(&auth)).await;

    Ok(HttpResponse::NoContent().finish())
}

async fn load_for_review(pool: &PgPool, auth: &AuthUser, entry_id: i64) -> ApiResult<TimeEntry> {
    let entry = load_entry(pool, entry_id).await?;
    let project = load_project(pool, entry.project_id).await?;

    ensure_can_review(auth, entry.user_id, project.manager_id)?;

    if !entry.status.is_open() {
        return Err(ApiError::bad_request(format!("Entry is already {}", entry.status)));
    }
    Ok(entry)
}

/// Approve a pending entry
#[utoipa::path(
    post,
    path = "/api/time-entries/{entry_id}/approve",
    params(("entry_id", Path, description = "Time entry ID")),
    responses(
        (status = 200, description = "Entry approved", body = TimeEntry),
        (status = 400, description = "Entry is not pending"),
        (status = 403, description = "Not allowed to review this entry"),
        (status = 404, description = "Entry not found")
    ),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn approve_time_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let entry_id = path.into_inner();
    load_for_review(pool.get_ref(), &auth, entry_id).await?;

    let approved = sqlx::query_as::<_, TimeEntry>(
        r#"
        UPDATE time_entries
        SET status = 'approved', approved_by = $1, approved_at = NOW(), updated_at = NOW()
        WHERE id = $2 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(entry_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::conflict("Entry was reviewed in the meantime"))?;

    info!(entry_id, by = auth.user_id, "Time entry approved");
    audit::record(pool.get_ref(), AuditEntry::new("time_entry.approve", "time_entry", Some(entry_id)).by(&auth)).await;

    Ok(HttpResponse::Ok().json(approved))
}

/// Reject a pending entry
#[utoipa::path(
    post,
    path = "/api/time-entries/{entry_id}/reject",
    params(("entry_id", Path, description = "Time entry ID")),
    request_body = RejectReq,
    responses(
        (status = 200, description = "Entry rejected", body = TimeEntry),
        (status = 400, description = "Missing reason or entry is not pending"),
        (status = 403, description = "Not allowed to review this entry"),
        (status = 404, description = "Entry not found")
    ),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn reject_time_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<RejectReq>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.required("reason", &body.reason, REASON_MAX_LEN);
    errors.into_result()?;

    let entry_id = path.into_inner();
    load_for_review(pool.get_ref(), &auth, entry_id).await?;

    let rejected = sqlx::query_as::<_, TimeEntry>(
        r#"
        UPDATE time_entries
        SET status = 'rejected', rejected_by = $1, rejected_at = NOW(), rejection_reason = $2, updated_at = NOW()
        WHERE id = $3 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(body.reason.trim())
    .bind(entry_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::conflict("Entry was reviewed in the meantime"))?;

    info!(entry_id, by = auth.user_id, "Time entry rejected");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("time_entry.reject", "time_entry", Some(entry_id))
            .by(&auth)
            .details(json!({ "reason": body.reason.trim() })),
    )
    .await;

    Ok(HttpResponse::Ok().json(rejected))
}

/// Hour totals over a date range
#[utoipa::path(
    get,
    path = "/api/time-entries/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Totals for the user and range", body = TimeSummary),
        (status = 403, description = "Not allowed to see that user's hours")
    ),
    tag = "Time tracking",
    security(("bearer_auth" = []))
)]
pub async fn time_summary(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<SummaryQuery>,
) -> ApiResult<HttpResponse> {
    let today = Utc::now().date_naive();
    let from = query.from.unwrap_or_else(|| month_start(today));
    let to = query.to.unwrap_or(today);

    let mut errors = FieldErrors::default();
    errors.date_order("to", Some(from), Some(to));
    errors.into_result()?;

    let user_id = query.user_id.unwrap_or(auth.user_id);
    if user_id != auth.user_id && auth.is_employee() {
        return Err(ApiError::forbidden("You can only see your own hours"));
    }

    // managers looking at someone else only see hours on projects they manage
    let manager_scope = (user_id != auth.user_id && auth.role == Role::Manager).then_some(auth.user_id);

    let summary = sqlx::query_as::<_, TimeSummary>(
        r#"
        SELECT
            $1::BIGINT AS user_id,
            $2::DATE AS "from",
            $3::DATE AS "to",
            COUNT(te.id) AS entries,
            COALESCE(SUM(te.hours), 0)::DOUBLE PRECISION AS total_hours,
            COALESCE(SUM(te.hours) FILTER (WHERE te.billable), 0)::DOUBLE PRECISION AS billable_hours,
            COALESCE(SUM(te.hours) FILTER (WHERE te.status = 'pending'), 0)::DOUBLE PRECISION AS pending_hours,
            COALESCE(SUM(te.hours) FILTER (WHERE te.status = 'approved'), 0)::DOUBLE PRECISION AS approved_hours,
            COALESCE(SUM(te.hours) FILTER (WHERE te.status = 'rejected'), 0)::DOUBLE PRECISION AS rejected_hours
        FROM time_entries te
        JOIN projects p ON p.id = te.project_id
        WHERE te.user_id = $1 AND te.date BETWEEN $2 AND $3
          AND ($4::BIGINT IS NULL OR p.manager_id = $4)
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .bind(manager_scope)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(user_id: i64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            email: "r@teamhub.io".to_string(),
            role,
            department_id: None,
            ip: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pending_entry() -> TimeEntry {
        TimeEntry {
            id: 11,
            user_id: 7,
            project_id: 3,
            task_id: Some(21),
            date: day(2026, 3, 9),
            hours: 6.0,
            description: Some("Sprint planning".to_string()),
            billable: true,
            status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn update_can_clear_nullable_fields() {
        let payload = json!({"description": null, "task_id": null});
        let merged = merge_update(payload.as_object().unwrap(), &pending_entry());
        assert_eq!(merged.description, None);
        assert_eq!(merged.task_id, None);
        assert_eq!(merged.hours, 6.0);

        let update = build_update_sql("time_entries", &payload, UPDATABLE_COLUMNS, 11).unwrap();
        assert_eq!(update.values[0], SqlValue::NullI64);
        assert_eq!(update.values[1], SqlValue::NullText);
    }

    #[test]
    fn update_keeps_absent_fields_and_rejects_nulling_required_ones() {
        let merged = merge_update(json!({"hours": 7.5}).as_object().unwrap(), &pending_entry());
        assert_eq!(
            merged,
            MergedEntry {
                date: day(2026, 3, 9),
                hours: 7.5,
                description: Some("Sprint planning".to_string()),
                task_id: Some(21),
            }
        );

        assert!(build_update_sql("time_entries", &json!({"hours": null}), UPDATABLE_COLUMNS, 11).is_err());
        assert!(build_update_sql("time_entries", &json!({"status": "approved"}), UPDATABLE_COLUMNS, 11).is_err());
    }

    #[test]
    fn entry_validation_collects_every_field() {
        let today = day(2026, 3, 10);
        let errors = validate_entry(day(2026, 3, 11), 0.0, Some(&"x".repeat(1001)), today);
        assert!(errors.has("hours"));
        assert!(errors.has("date"));
        assert!(errors.has("description"));

        assert!(validate_entry(today, 8.0, None, today).is_empty());
        assert!(validate_entry(today, 24.0, None, today).is_empty());
        assert!(validate_entry(today, 24.25, None, today).has("hours"));
    }

    #[test]
    fn nobody_reviews_their_own_entry() {
        for role in [Role::Admin, Role::Rrhh, Role::Manager] {
            let err = ensure_can_review(&caller(3, role), 3, Some(3)).unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)));
        }
    }

    #[test]
    fn managers_review_only_their_projects() {
        assert!(ensure_can_review(&caller(4, Role::Manager), 9, Some(4)).is_ok());
        assert!(ensure_can_review(&caller(4, Role::Manager), 9, Some(5)).is_err());
        assert!(ensure_can_review(&caller(4, Role::Manager), 9, None).is_err());
        assert!(ensure_can_review(&caller(2, Role::Rrhh), 9, Some(5)).is_ok());
        assert!(ensure_can_review(&caller(1, Role::Admin), 9, None).is_ok());
        assert!(ensure_can_review(&caller(6, Role::Employee), 9, Some(6)).is_err());
    }

    #[test]
    fn visibility_depends_on_role() {
        let mut staff = Filters::new();
        visibility_filter(&caller(1, Role::Rrhh), &mut staff);
        assert_eq!(staff.where_clause(), "");

        let mut manager = Filters::new();
        visibility_filter(&caller(4, Role::Manager), &mut manager);
        assert_eq!(manager.where_clause(), "WHERE (te.user_id = $1 OR p.manager_id = $2)");

        let mut employee = Filters::new();
        visibility_filter(&caller(7, Role::Employee), &mut employee);
        assert_eq!(employee.where_clause(), "WHERE te.user_id = $1");
    }

    #[test]
    fn month_start_is_the_first() {
        assert_eq!(month_start(day(2026, 2, 17)), day(2026, 2, 1));
    }
}
