use crate::{
    api::projects::{ensure_can_manage, load_project},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::task::{Task, TaskPriority, TaskStatus},
    utils::{
        audit::{self, AuditEntry},
        db_utils::{Column, ColumnKind, Filters, SqlValue, as_object, build_update_sql, execute_update, fetch_page},
        pagination::{Page, PaginatedTasks},
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
    Column::required("title", ColumnKind::Text),
    Column::nullable("description", ColumnKind::Text),
    Column::required("status", ColumnKind::OneOf(TaskStatus::NAMES)),
    Column::required("priority", ColumnKind::OneOf(TaskPriority::NAMES)),
    Column::nullable("assignee_id", ColumnKind::BigInt),
    Column::nullable("due_date", ColumnKind::Date),
    Column::nullable("estimated_hours", ColumnKind::Float),
];

/// What an assignee without management rights may change.
const ASSIGNEE_COLUMNS: &[Column] = &[Column::required("status", ColumnKind::OneOf(TaskStatus::NAMES))];

#[derive(Deserialize, ToSchema)]
pub struct CreateTaskReq {
    #[schema(example = "Map legacy payroll fields")]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<i64>,
    #[schema(example = "2026-02-15", format = "date", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
    #[schema(example = 6.0)]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
    pub priority: Option<TaskPriority>,
}

async fn load_task(pool: &PgPool, task_id: i64) -> ApiResult<Task> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

fn validate_estimate(errors: &mut FieldErrors, hours: Option<f64>) {
    if let Some(h) = hours {
        if !h.is_finite() || h < 0.0 {
            errors.add("estimated_hours", "Must be a non-negative number");
        }
    }
}

/// List tasks of a project
#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/tasks",
    params(("project_id", Path, description = "Project ID"), TaskListQuery),
    responses(
        (status = 200, description = "Paginated tasks", body = PaginatedTasks),
        (status = 404, description = "Project not found")
    ),
    tag = "Tasks",
    security(("bearer_auth" = []))
)]
pub async fn list_project_tasks(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    query: web::Query<TaskListQuery>,
) -> ApiResult<HttpResponse> {
    let project = load_project(pool.get_ref(), path.into_inner()).await?;
    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    filters.eq("project_id", SqlValue::I64(project.id));
    if let Some(status) = query.status {
        filters.eq("status", SqlValue::String(status.to_string()));
    }
    if let Some(priority) = query.priority {
        filters.eq("priority", SqlValue::String(priority.to_string()));
    }
    if let Some(assignee_id) = query.assignee_id {
        filters.eq("assignee_id", SqlValue::I64(assignee_id));
    }

    let (tasks, total) = fetch_page::<Task>(
        pool.get_ref(),
        "*",
        "tasks",
        &filters,
        "due_date ASC NULLS LAST, id",
        page,
    )
    .await?;

    let body: PaginatedTasks = page.wrap(tasks, total);
    Ok(HttpResponse::Ok().json(body))
}

/// Create a task in a project
#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/tasks",
    params(("project_id", Path, description = "Project ID")),
    request_body = CreateTaskReq,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation failed or project closed"),
        (status = 403, description = "Not the project's manager"),
        (status = 404, description = "Project not found")
    ),
    tag = "Tasks",
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<CreateTaskReq>,
) -> ApiResult<HttpResponse> {
    let project = load_project(pool.get_ref(), path.into_inner()).await?;
    ensure_can_manage(&auth, &project)?;

    if project.status.is_terminal() {
        return Err(ApiError::bad_request(format!("Project is {}", project.status)));
    }

    let mut errors = FieldErrors::default();
    errors.required("title", &body.title, 200);
    errors.optional_max_len("description", body.description.as_deref(), 5000);
    validate_estimate(&mut errors, body.estimated_hours);
    errors.into_result()?;

    let task = sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (project_id, title, description, status, priority, assignee_id, due_date, estimated_hours)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(project.id)
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(body.status.unwrap_or(TaskStatus::Todo).as_ref())
    .bind(body.priority.unwrap_or(TaskPriority::Medium).as_ref())
    .bind(body.assignee_id)
    .bind(body.due_date)
    .bind(body.estimated_hours)
    .fetch_one(pool.get_ref())
    .await?;

    info!(task_id = task.id, project_id = project.id, "Task created");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("task.create", "task", Some(task.id))
            .by(&auth)
            .details(json!({ "project_id": project.id, "assignee_id": task.assignee_id })),
    )
    .await;

    Ok(HttpResponse::Created().json(task))
}

/// Get a task
#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id", Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 404, description = "Task not found")
    ),
    tag = "Tasks",
    security(("bearer_auth" = []))
)]
pub async fn get_task(_auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let task = load_task(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Update a task
///
/// Project managers and admins may change any field; the assignee may only
/// change `status`.
#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}",
    params(("task_id", Path, description = "Task ID")),
    request_body(content = Object, example = json!({"status": "review"})),
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Task not found")
    ),
    tag = "Tasks",
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let task = load_task(pool.get_ref(), task_id).await?;
    let project = load_project(pool.get_ref(), task.project_id).await?;

    let columns = if ensure_can_manage(&auth, &project).is_ok() {
        UPDATABLE_COLUMNS
    } else if task.assignee_id == Some(auth.user_id) {
        ASSIGNEE_COLUMNS
    } else {
        return Err(ApiError::forbidden("You can only update tasks assigned to you"));
    };

    let mut errors = FieldErrors::default();
    validate_estimate(&mut errors, as_object(&body)?.get("estimated_hours").and_then(Value::as_f64));
    errors.into_result()?;

    let update = build_update_sql("tasks", &body, columns, task_id)?;
    execute_update(pool.get_ref(), update).await?;

    info!(task_id, "Task updated");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("task.update", "task", Some(task_id))
            .by(&auth)
            .details(body.into_inner()),
    )
    .await;

    let updated = load_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id", Path, description = "Task ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Task not found")
    ),
    tag = "Tasks",
    security(("bearer_auth" = []))
)]
pub async fn delete_task(auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let task = load_task(pool.get_ref(), task_id).await?;
    let project = load_project(pool.get_ref(), task.project_id).await?;
    ensure_can_manage(&auth, &project)?;

    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task_id)
        .execute(pool.get_ref())
        .await?;

    info!(task_id, "Task deleted");
    audit::record(pool.get_ref(), AuditEntry::new("task.delete", "task", Some(task_id)).by(&auth)).await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignee_can_only_touch_status() {
        let update = build_update_sql("tasks", &json!({"status": "done"}), ASSIGNEE_COLUMNS, 4).unwrap();
        assert_eq!(update.sql, "UPDATE tasks SET status = $1, updated_at = NOW() WHERE id = $2");

        let err = build_update_sql("tasks", &json!({"status": "done", "assignee_id": 2}), ASSIGNEE_COLUMNS, 4)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(f) if f.has("assignee_id")));
    }

    #[test]
    fn negative_estimates_are_rejected() {
        let mut errors = FieldErrors::default();
        validate_estimate(&mut errors, Some(-2.0));
        assert!(errors.has("estimated_hours"));

        let mut errors = FieldErrors::default();
        validate_estimate(&mut errors, Some(0.0));
        validate_estimate(&mut errors, None);
        assert!(errors.is_empty());
    }
}
