use crate::{
    auth::auth::{AuthUser, STAFF_AND_MANAGERS},
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        role::Role,
        template::{OnboardingTemplate, TemplateTask},
    },
    utils::audit::{self, AuditEntry},
    validation::FieldErrors,
};
use actix_web::{HttpResponse, http::header, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const MAX_OFFSET_DAYS: i32 = 365;

#[derive(Deserialize, ToSchema)]
pub struct TemplateTaskReq {
    #[schema(example = "Sign employment contract")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = 0)]
    pub due_offset_days: i32,
    /// Defaults to `employee`
    pub responsible_role: Option<Role>,
}

/// Body for both create and update; on update the task list is replaced.
#[derive(Deserialize, ToSchema)]
pub struct TemplateReq {
    #[schema(example = "Engineering onboarding")]
    pub name: String,
    pub description: Option<String>,
    pub department_id: Option<i64>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub tasks: Vec<TemplateTaskReq>,
}

#[derive(Serialize, ToSchema)]
pub struct TemplateDetail {
    pub template: OnboardingTemplate,
    pub tasks: Vec<TemplateTask>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TemplateListQuery {
    pub is_active: Option<bool>,
    pub department_id: Option<i64>,
}

fn validate(body: &TemplateReq) -> ApiResult<()> {
    let mut errors = FieldErrors::default();
    errors.required("name", &body.name, 150);
    errors.optional_max_len("description", body.description.as_deref(), 2000);

    for (i, task) in body.tasks.iter().enumerate() {
        errors.required(&format!("tasks[{i}].title"), &task.title, 200);
        if !(0..=MAX_OFFSET_DAYS).contains(&task.due_offset_days) {
            errors.add(
                &format!("tasks[{i}].due_offset_days"),
                format!("Must be between 0 and {MAX_OFFSET_DAYS}"),
            );
        }
    }

    errors.into_result()
}

async fn insert_tasks(
    tx: &mut Transaction<'_, Postgres>,
    template_id: i64,
    tasks: &[TemplateTaskReq],
) -> Result<(), sqlx::Error> {
    for (i, task) in tasks.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO template_tasks (template_id, title, description, due_offset_days, responsible_role, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(template_id)
        .bind(task.title.trim())
        .bind(&task.description)
        .bind(task.due_offset_days)
        .bind(task.responsible_role.unwrap_or(Role::Employee).as_ref())
        .bind(i as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub(crate) async fn load_template_tasks(pool: &PgPool, template_id: i64) -> Result<Vec<TemplateTask>, sqlx::Error> {
    sqlx::query_as::<_, TemplateTask>("SELECT * FROM template_tasks WHERE template_id = $1 ORDER BY sort_order, id")
        .bind(template_id)
        .fetch_all(pool)
        .await
}

async fn load_detail(pool: &PgPool, template_id: i64) -> ApiResult<TemplateDetail> {
    let template = sqlx::query_as::<_, OnboardingTemplate>("SELECT * FROM onboarding_templates WHERE id = $1")
        .bind(template_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    let tasks = load_template_tasks(pool, template_id).await?;
    Ok(TemplateDetail { template, tasks })
}

/// List onboarding templates
#[utoipa::path(
    get,
    path = "/api/templates",
    params(TemplateListQuery),
    responses((status = 200, description = "Templates", body = [OnboardingTemplate])),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn list_templates(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    query: web::Query<TemplateListQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_roles(STAFF_AND_MANAGERS)?;

    let templates = sqlx::query_as::<_, OnboardingTemplate>(
        r#"
        SELECT * FROM onboarding_templates
        WHERE ($1::BOOLEAN IS NULL OR is_active = $1)
          AND ($2::BIGINT IS NULL OR department_id = $2)
        ORDER BY name
        "#,
    )
    .bind(query.is_active)
    .bind(query.department_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, format!("private, max-age={}", config.cache_long_secs)))
        .json(templates))
}

/// Get a template with its tasks
#[utoipa::path(
    get,
    path = "/api/templates/{template_id}",
    params(("template_id", Path, description = "Template ID")),
    responses(
        (status = 200, description = "Template with ordered tasks", body = TemplateDetail),
        (status = 404, description = "Template not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn get_template(auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    auth.require_roles(STAFF_AND_MANAGERS)?;
    let detail = load_detail(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Create a template
#[utoipa::path(
    post,
    path = "/api/templates",
    request_body = TemplateReq,
    responses(
        (status = 201, description = "Template created", body = TemplateDetail),
        (status = 400, description = "Validation failed")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn create_template(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<TemplateReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    validate(&body)?;

    let mut tx = pool.begin().await?;

    let (template_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO onboarding_templates (name, description, department_id, is_active, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(body.department_id)
    .bind(body.is_active.unwrap_or(true))
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await?;

    insert_tasks(&mut tx, template_id, &body.tasks).await?;
    tx.commit().await?;

    info!(template_id, tasks = body.tasks.len(), "Onboarding template created");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("template.create", "onboarding_template", Some(template_id))
            .by(&auth)
            .details(json!({ "name": body.name.trim(), "tasks": body.tasks.len() })),
    )
    .await;

    let detail = load_detail(pool.get_ref(), template_id).await?;
    Ok(HttpResponse::Created().json(detail))
}

/// Replace a template and its task list
#[utoipa::path(
    put,
    path = "/api/templates/{template_id}",
    params(("template_id", Path, description = "Template ID")),
    request_body = TemplateReq,
    responses(
        (status = 200, description = "Template updated", body = TemplateDetail),
        (status = 404, description = "Template not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn update_template(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<TemplateReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    validate(&body)?;
    let template_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE onboarding_templates
        SET name = $1, description = $2, department_id = $3, is_active = COALESCE($4, is_active), updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(body.department_id)
    .bind(body.is_active)
    .bind(template_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Template not found"));
    }

    // Running processes keep their own copies of the tasks.
    sqlx::query("DELETE FROM template_tasks WHERE template_id = $1")
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

    insert_tasks(&mut tx, template_id, &body.tasks).await?;
    tx.commit().await?;

    audit::record(
        pool.get_ref(),
        AuditEntry::new("template.update", "onboarding_template", Some(template_id)).by(&auth),
    )
    .await;

    let detail = load_detail(pool.get_ref(), template_id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Delete a template
#[utoipa::path(
    delete,
    path = "/api/templates/{template_id}",
    params(("template_id", Path, description = "Template ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Template not found"),
        (status = 409, description = "Template is used by onboarding processes")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn delete_template(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let template_id = path.into_inner();

    let result = sqlx::query("DELETE FROM onboarding_templates WHERE id = $1")
        .bind(template_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Template is used by onboarding processes; deactivate it instead"),
            other => other,
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Template not found"));
    }

    audit::record(
        pool.get_ref(),
        AuditEntry::new("template.delete", "onboarding_template", Some(template_id)).by(&auth),
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, offset: i32) -> TemplateTaskReq {
        TemplateTaskReq {
            title: title.to_string(),
            description: None,
            due_offset_days: offset,
            responsible_role: None,
        }
    }

    #[test]
    fn task_errors_are_indexed() {
        let body = TemplateReq {
            name: "Sales".to_string(),
            description: None,
            department_id: None,
            is_active: None,
            tasks: vec![task("Laptop", 0), task("", 3), task("Buddy lunch", 400)],
        };

        match validate(&body) {
            Err(ApiError::Validation(fields)) => {
                assert!(fields.has("tasks[1].title"));
                assert!(fields.has("tasks[2].due_offset_days"));
                assert!(!fields.has("tasks[0].title"));
                assert!(!fields.has("name"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn template_without_tasks_is_valid() {
        let body = TemplateReq {
            name: "Empty".to_string(),
            description: None,
            department_id: None,
            is_active: Some(false),
            tasks: vec![],
        };
        assert!(validate(&body).is_ok());
    }
}
