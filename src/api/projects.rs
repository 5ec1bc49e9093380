use crate::{
    auth::auth::{AuthUser, MANAGERS},
    error::{ApiError, ApiResult},
    model::project::{Project, ProjectStatus},
    utils::{
        audit::{self, AuditEntry},
        db_utils::{Column, ColumnKind, Filters, SqlValue, as_object, build_update_sql, execute_update, fetch_page},
        pagination::{Page, PaginatedProjects},
    },
    validation::FieldErrors,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::required("name", ColumnKind::Text),
    Column::nullable("description", ColumnKind::Text),
    Column::required("status", ColumnKind::OneOf(ProjectStatus::NAMES)),
    Column::nullable("manager_id", ColumnKind::BigInt),
    Column::nullable("department_id", ColumnKind::BigInt),
    Column::nullable("start_date", ColumnKind::Date),
    Column::nullable("end_date", ColumnKind::Date),
];

#[derive(Deserialize, ToSchema)]
pub struct CreateProjectReq {
    #[schema(example = "Payroll migration")]
    pub name: String,
    pub description: Option<String>,
    /// `planning` (default) or `active`
    pub status: Option<ProjectStatus>,
    /// Admin only; managers always manage the projects they create
    pub manager_id: Option<i64>,
    pub department_id: Option<i64>,
    #[schema(example = "2026-02-01", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-06-30", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<ProjectStatus>,
    pub manager_id: Option<i64>,
    pub search: Option<String>,
}

const LOCK_PROJECT_SQL: &str = "SELECT * FROM projects WHERE id = $1 FOR UPDATE";

pub(crate) async fn load_project(pool: &PgPool, project_id: i64) -> ApiResult<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Admins edit any project, managers only the ones they manage.
pub(crate) fn ensure_can_manage(auth: &AuthUser, project: &Project) -> ApiResult<()> {
    auth.require_roles(MANAGERS)?;
    if auth.is_admin() || project.manager_id == Some(auth.user_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only manage your own projects"))
    }
}

/// Reads an optional date out of an update payload; absent keys keep `current`.
fn merged_date(obj: &serde_json::Map<String, Value>, key: &str, current: Option<NaiveDate>) -> Option<NaiveDate> {
    match obj.get(key) {
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
        Some(_) => None,
        None => current,
    }
}

fn validate_update(auth: &AuthUser, project: &Project, payload: &Value) -> ApiResult<()> {
    let obj = as_object(payload)?;
    let mut errors = FieldErrors::default();

    if let Some(Value::String(raw)) = obj.get("status") {
        if let Ok(next) = raw.parse::<ProjectStatus>() {
            if !project.status.can_transition_to(next) {
                errors.add(
                    "status",
                    format!("Cannot change status from '{}' to '{}'", project.status, next),
                );
            }
        }
    }

    if let Some(manager) = obj.get("manager_id") {
        if !auth.is_admin() && manager.as_i64() != Some(auth.user_id) {
            return Err(ApiError::forbidden("Only administrators can reassign a project"));
        }
    }

    errors.date_order(
        "end_date",
        merged_date(obj, "start_date", project.start_date),
        merged_date(obj, "end_date", project.end_date),
    );

    errors.into_result()
}

/// List projects
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectListQuery),
    responses((status = 200, description = "Paginated projects", body = PaginatedProjects)),
    tag = "Projects",
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<ProjectListQuery>,
) -> ApiResult<HttpResponse> {
    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(status) = query.status {
        filters.eq("status", SqlValue::String(status.to_string()));
    }
    if let Some(manager_id) = query.manager_id {
        filters.eq("manager_id", SqlValue::I64(manager_id));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        filters.search(&["name", "description"], search);
    }

    let (projects, total) =
        fetch_page::<Project>(pool.get_ref(), "*", "projects", &filters, "created_at DESC, id DESC", page).await?;

    let body: PaginatedProjects = page.wrap(projects, total);
    Ok(HttpResponse::Ok().json(body))
}

/// Get a project
#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    params(("project_id", Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project", body = Project),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(("bearer_auth" = []))
)]
pub async fn get_project(_auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let project = load_project(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// Create a project
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectReq,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Projects",
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<CreateProjectReq>,
) -> ApiResult<HttpResponse> {
    auth.require_roles(MANAGERS)?;

    let status = body.status.unwrap_or(ProjectStatus::Planning);

    let mut errors = FieldErrors::default();
    errors.required("name", &body.name, 150);
    errors.optional_max_len("description", body.description.as_deref(), 5000);
    errors.date_order("end_date", body.start_date, body.end_date);
    if !matches!(status, ProjectStatus::Planning | ProjectStatus::Active) {
        errors.add("status", "New projects start as 'planning' or 'active'");
    }
    errors.into_result()?;

    let manager_id = if auth.is_admin() {
        body.manager_id
    } else {
        Some(auth.user_id)
    };

    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (name, description, status, manager_id, department_id, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(status.as_ref())
    .bind(manager_id)
    .bind(body.department_id)
    .bind(body.start_date)
    .bind(body.end_date)
    .fetch_one(pool.get_ref())
    .await?;

    info!(project_id = project.id, "Project created");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("project.create", "project", Some(project.id))
            .by(&auth)
            .details(json!({ "name": project.name, "status": project.status })),
    )
    .await;

    Ok(HttpResponse::Created().json(project))
}

/// Update a project
///
/// Partial update. Status changes follow the project lifecycle.
#[utoipa::path(
    put,
    path = "/api/projects/{project_id}",
    params(("project_id", Path, description = "Project ID")),
    request_body(content = Object, example = json!({"status": "active"})),
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Validation failed or transition not allowed"),
        (status = 403, description = "Not the project's manager"),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let project_id = path.into_inner();

    // Row stays locked until commit so the status checked is the status replaced.
    let mut tx = pool.begin().await?;
    let project = sqlx::query_as::<_, Project>(LOCK_PROJECT_SQL)
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    ensure_can_manage(&auth, &project)?;

    let update = build_update_sql("projects", &body, UPDATABLE_COLUMNS, project_id)?;
    validate_update(&auth, &project, &body)?;

    execute_update(&mut *tx, update).await?;
    tx.commit().await?;

    info!(project_id, "Project updated");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("project.update", "project", Some(project_id))
            .by(&auth)
            .details(body.into_inner()),
    )
    .await;

    let updated = load_project(pool.get_ref(), project_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Delete a project
#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}",
    params(("project_id", Path, description = "Project ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(("bearer_auth" = []))
)]
pub async fn delete_project(auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let project_id = path.into_inner();

    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project not found"));
    }

    info!(project_id, "Project deleted");
    audit::record(pool.get_ref(), AuditEntry::new("project.delete", "project", Some(project_id)).by(&auth)).await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use chrono::Utc;

    fn project(status: ProjectStatus, manager_id: Option<i64>) -> Project {
        Project {
            id: 3,
            name: "Apollo".to_string(),
            description: None,
            status,
            manager_id,
            department_id: None,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 10),
            end_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn caller(user_id: i64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            email: "m@teamhub.io".to_string(),
            role,
            department_id: None,
            ip: None,
        }
    }

    #[test]
    fn managers_only_manage_their_own_projects() {
        let p = project(ProjectStatus::Active, Some(4));
        assert!(ensure_can_manage(&caller(4, Role::Manager), &p).is_ok());
        assert!(matches!(
            ensure_can_manage(&caller(5, Role::Manager), &p),
            Err(ApiError::Forbidden(_))
        ));
        assert!(ensure_can_manage(&caller(1, Role::Admin), &p).is_ok());
        assert!(ensure_can_manage(&caller(4, Role::Employee), &p).is_err());
    }

    #[test]
    fn rejects_disallowed_transition() {
        let p = project(ProjectStatus::Planning, Some(4));
        let err = validate_update(&caller(4, Role::Manager), &p, &json!({"status": "completed"})).unwrap_err();
        assert!(matches!(err, ApiError::Validation(f) if f.has("status")));

        assert!(validate_update(&caller(4, Role::Manager), &p, &json!({"status": "active"})).is_ok());
    }

    #[test]
    fn update_checks_the_locked_row_state() {
        assert!(LOCK_PROJECT_SQL.ends_with("FOR UPDATE"));

        // Another writer cancelled the project between the caller's read and this update.
        let locked = project(ProjectStatus::Cancelled, Some(4));
        let err = validate_update(&caller(4, Role::Manager), &locked, &json!({"status": "active"})).unwrap_err();
        assert!(matches!(err, ApiError::Validation(f) if f.has("status")));
    }

    #[test]
    fn end_date_checked_against_stored_start() {
        let p = project(ProjectStatus::Active, Some(4));
        let err = validate_update(&caller(1, Role::Admin), &p, &json!({"end_date": "2026-01-01"})).unwrap_err();
        assert!(matches!(err, ApiError::Validation(f) if f.has("end_date")));
    }

    #[test]
    fn managers_cannot_reassign() {
        let p = project(ProjectStatus::Active, Some(4));
        assert!(matches!(
            validate_update(&caller(4, Role::Manager), &p, &json!({"manager_id": 9})),
            Err(ApiError::Forbidden(_))
        ));
        assert!(validate_update(&caller(1, Role::Admin), &p, &json!({"manager_id": 9})).is_ok());
    }
}
