use crate::{
    api::templates::load_template_tasks,
    auth::auth::{AuthUser, STAFF_AND_MANAGERS},
    error::{ApiError, ApiResult},
    model::{
        process::{
            OnboardingProcess, ProcessStatus, ProcessTask, due_date_for, process_due_date, progress_percent,
            status_after_task_completion,
        },
        template::OnboardingTemplate,
    },
    utils::{
        audit::{self, AuditEntry},
        db_utils::{Filters, SqlValue, fetch_page},
        pagination::{Page, PaginatedProcesses},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateProcessReq {
    #[schema(example = 1)]
    pub template_id: i64,
    #[schema(example = 7)]
    pub employee_id: i64,
    #[schema(example = "2026-02-02", format = "date", value_type = String)]
    pub start_date: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProcessStatusReq {
    pub status: ProcessStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProcessListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<ProcessStatus>,
    /// Ignored for employees, who only see their own processes
    pub employee_id: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ProcessProgress {
    #[schema(example = 4)]
    pub total: i64,
    #[schema(example = 1)]
    pub completed: i64,
    #[schema(example = 25)]
    pub percent: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ProcessDetail {
    pub process: OnboardingProcess,
    pub tasks: Vec<ProcessTask>,
    pub progress: ProcessProgress,
}

async fn load_process(pool: &PgPool, process_id: i64) -> ApiResult<OnboardingProcess> {
    sqlx::query_as::<_, OnboardingProcess>("SELECT * FROM onboarding_processes WHERE id = $1")
        .bind(process_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Onboarding process not found"))
}

async fn load_detail(pool: &PgPool, process: OnboardingProcess) -> ApiResult<ProcessDetail> {
    let tasks = sqlx::query_as::<_, ProcessTask>(
        "SELECT * FROM process_tasks WHERE process_id = $1 ORDER BY sort_order, id",
    )
    .bind(process.id)
    .fetch_all(pool)
    .await?;

    let total = tasks.len() as i64;
    let completed = tasks.iter().filter(|t| t.completed).count() as i64;

    Ok(ProcessDetail {
        process,
        tasks,
        progress: ProcessProgress {
            total,
            completed,
            percent: progress_percent(completed, total),
        },
    })
}

/// Employees only ever see the processes they are onboarded by.
fn ensure_visible(auth: &AuthUser, process: &OnboardingProcess) -> ApiResult<()> {
    if process.employee_id == auth.user_id {
        return Ok(());
    }
    auth.require_roles(STAFF_AND_MANAGERS)
        .map_err(|_| ApiError::not_found("Onboarding process not found"))
}

/// Start an onboarding process from a template
#[utoipa::path(
    post,
    path = "/api/processes",
    request_body = CreateProcessReq,
    responses(
        (status = 201, description = "Process created with its tasks", body = ProcessDetail),
        (status = 400, description = "Template inactive or employee inactive"),
        (status = 404, description = "Template or employee not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn create_process(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<CreateProcessReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let template = sqlx::query_as::<_, OnboardingTemplate>("SELECT * FROM onboarding_templates WHERE id = $1")
        .bind(body.template_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    if !template.is_active {
        return Err(ApiError::bad_request("Template is not active"));
    }

    let employee_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
        .bind(body.employee_id)
        .fetch_optional(pool.get_ref())
        .await?;

    match employee_active {
        None => return Err(ApiError::not_found("Employee not found")),
        Some(false) => return Err(ApiError::bad_request("Employee account is not active")),
        Some(true) => {}
    }

    let template_tasks = load_template_tasks(pool.get_ref(), template.id).await?;
    let offsets: Vec<i32> = template_tasks.iter().map(|t| t.due_offset_days).collect();
    let due_date = process_due_date(body.start_date, &offsets);

    let mut tx = pool.begin().await?;

    let process = sqlx::query_as::<_, OnboardingProcess>(
        r#"
        INSERT INTO onboarding_processes (template_id, employee_id, status, start_date, due_date, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(template.id)
    .bind(body.employee_id)
    .bind(ProcessStatus::Pending.as_ref())
    .bind(body.start_date)
    .bind(due_date)
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await?;

    for task in &template_tasks {
        sqlx::query(
            r#"
            INSERT INTO process_tasks (process_id, title, description, due_date, responsible_role, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(process.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(due_date_for(body.start_date, task.due_offset_days))
        .bind(task.responsible_role.as_ref())
        .bind(task.sort_order)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        process_id = process.id,
        employee_id = body.employee_id,
        tasks = template_tasks.len(),
        "Onboarding process created"
    );
    audit::record(
        pool.get_ref(),
        AuditEntry::new("process.create", "onboarding_process", Some(process.id))
            .by(&auth)
            .details(json!({ "template_id": template.id, "employee_id": body.employee_id })),
    )
    .await;

    let detail = load_detail(pool.get_ref(), process).await?;
    Ok(HttpResponse::Created().json(detail))
}

/// List onboarding processes
#[utoipa::path(
    get,
    path = "/api/processes",
    params(ProcessListQuery),
    responses((status = 200, description = "Paginated processes", body = PaginatedProcesses)),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn list_processes(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<ProcessListQuery>,
) -> ApiResult<HttpResponse> {
    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    if auth.is_employee() {
        filters.eq("employee_id", SqlValue::I64(auth.user_id));
    } else if let Some(employee_id) = query.employee_id {
        filters.eq("employee_id", SqlValue::I64(employee_id));
    }
    if let Some(status) = query.status {
        filters.eq("status", SqlValue::String(status.to_string()));
    }

    let (processes, total) = fetch_page::<OnboardingProcess>(
        pool.get_ref(),
        "*",
        "onboarding_processes",
        &filters,
        "start_date DESC, id DESC",
        page,
    )
    .await?;

    let body: PaginatedProcesses = page.wrap(processes, total);
    Ok(HttpResponse::Ok().json(body))
}

/// Get a process with tasks and progress
#[utoipa::path(
    get,
    path = "/api/processes/{process_id}",
    params(("process_id", Path, description = "Process ID")),
    responses(
        (status = 200, description = "Process detail", body = ProcessDetail),
        (status = 404, description = "Process not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn get_process(auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let process = load_process(pool.get_ref(), path.into_inner()).await?;
    ensure_visible(&auth, &process)?;

    let detail = load_detail(pool.get_ref(), process).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Change a process status
#[utoipa::path(
    put,
    path = "/api/processes/{process_id}/status",
    params(("process_id", Path, description = "Process ID")),
    request_body = UpdateProcessStatusReq,
    responses(
        (status = 200, description = "Status changed", body = OnboardingProcess),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Process not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn update_process_status(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<UpdateProcessStatusReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let process_id = path.into_inner();

    let current = load_process(pool.get_ref(), process_id).await?;
    if !current.status.can_transition_to(body.status) {
        return Err(ApiError::bad_request(format!(
            "Cannot change status from '{}' to '{}'",
            current.status, body.status
        )));
    }

    // status re-checked in the WHERE clause against concurrent changes
    let updated = sqlx::query_as::<_, OnboardingProcess>(
        r#"
        UPDATE onboarding_processes
        SET status = $1,
            completed_at = CASE WHEN $1 = 'completed' THEN NOW() ELSE completed_at END,
            updated_at = NOW()
        WHERE id = $2 AND status = $3
        RETURNING *
        "#,
    )
    .bind(body.status.as_ref())
    .bind(process_id)
    .bind(current.status.as_ref())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::conflict("Process status changed concurrently, retry"))?;

    info!(process_id, from = %current.status, to = %body.status, "Process status changed");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("process.status", "onboarding_process", Some(process_id))
            .by(&auth)
            .details(json!({ "from": current.status, "to": body.status })),
    )
    .await;

    Ok(HttpResponse::Ok().json(updated))
}

/// Complete one task of a process
#[utoipa::path(
    post,
    path = "/api/processes/{process_id}/tasks/{task_id}/complete",
    params(
        ("process_id", Path, description = "Process ID"),
        ("task_id", Path, description = "Process task ID")
    ),
    responses(
        (status = 200, description = "Updated process detail", body = ProcessDetail),
        (status = 400, description = "Process is closed"),
        (status = 404, description = "Process or task not found"),
        (status = 409, description = "Task already completed")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn complete_process_task(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<(i64, i64)>,
) -> ApiResult<HttpResponse> {
    let (process_id, task_id) = path.into_inner();

    let mut tx = pool.begin().await?;

    let process = sqlx::query_as::<_, OnboardingProcess>(
        "SELECT * FROM onboarding_processes WHERE id = $1 FOR UPDATE",
    )
    .bind(process_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Onboarding process not found"))?;

    ensure_visible(&auth, &process)?;

    if process.status.is_closed() {
        return Err(ApiError::bad_request(format!("Process is {}", process.status)));
    }

    let marked = sqlx::query(
        r#"
        UPDATE process_tasks
        SET completed = TRUE, completed_by = $1, completed_at = NOW()
        WHERE id = $2 AND process_id = $3 AND completed = FALSE
        "#,
    )
    .bind(auth.user_id)
    .bind(task_id)
    .bind(process_id)
    .execute(&mut *tx)
    .await?;

    if marked.rows_affected() == 0 {
        let exists: Option<bool> =
            sqlx::query_scalar("SELECT completed FROM process_tasks WHERE id = $1 AND process_id = $2")
                .bind(task_id)
                .bind(process_id)
                .fetch_optional(&mut *tx)
                .await?;
        return Err(match exists {
            Some(_) => ApiError::conflict("Task already completed"),
            None => ApiError::not_found("Task not found in this process"),
        });
    }

    let (completed, total): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*) FILTER (WHERE completed), COUNT(*) FROM process_tasks WHERE process_id = $1",
    )
    .bind(process_id)
    .fetch_one(&mut *tx)
    .await?;

    let next = status_after_task_completion(process.status, completed, total);
    if next != process.status {
        sqlx::query(
            r#"
            UPDATE onboarding_processes
            SET status = $1,
                completed_at = CASE WHEN $1 = 'completed' THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(next.as_ref())
        .bind(process_id)
        .execute(&mut *tx)
        .await?;
        debug!(process_id, from = %process.status, to = %next, "Process status advanced");
    }

    tx.commit().await?;

    info!(process_id, task_id, completed, total, "Process task completed");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("process.task_complete", "onboarding_process", Some(process_id))
            .by(&auth)
            .details(json!({ "task_id": task_id })),
    )
    .await;

    let process = load_process(pool.get_ref(), process_id).await?;
    let detail = load_detail(pool.get_ref(), process).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use chrono::Utc;

    fn process_for(employee_id: i64) -> OnboardingProcess {
        let today = Utc::now().date_naive();
        OnboardingProcess {
            id: 1,
            template_id: 1,
            employee_id,
            status: ProcessStatus::Pending,
            start_date: today,
            due_date: today,
            created_by: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn caller(user_id: i64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            email: "x@teamhub.io".to_string(),
            role,
            department_id: None,
            ip: None,
        }
    }

    #[test]
    fn employees_see_only_their_own_process() {
        let process = process_for(7);
        assert!(ensure_visible(&caller(7, Role::Employee), &process).is_ok());
        assert!(matches!(
            ensure_visible(&caller(8, Role::Employee), &process),
            Err(ApiError::NotFound(_))
        ));
        assert!(ensure_visible(&caller(8, Role::Manager), &process).is_ok());
        assert!(ensure_visible(&caller(8, Role::Rrhh), &process).is_ok());
    }
}
