use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::department::Department,
    utils::{
        audit::{self, AuditEntry},
        db_utils::{Column, ColumnKind, build_update_sql, execute_update},
    },
    validation::FieldErrors,
};
use actix_web::{HttpResponse, http::header, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use tracing::info;
use utoipa::ToSchema;

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::required("name", ColumnKind::Text),
    Column::nullable("description", ColumnKind::Text),
    Column::nullable("manager_id", ColumnKind::BigInt),
];

#[derive(Deserialize, ToSchema)]
pub struct CreateDepartmentReq {
    #[schema(example = "Engineering")]
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<i64>,
}

/// List departments
#[utoipa::path(
    get,
    path = "/api/departments",
    responses((status = 200, description = "All departments", body = [Department])),
    tag = "Departments",
    security(("bearer_auth" = []))
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let departments = sqlx::query_as::<_, Department>("SELECT * FROM departments ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok()
        .insert_header((
            header::CACHE_CONTROL,
            format!("private, max-age={}", config.cache_medium_secs),
        ))
        .json(departments))
}

/// Get a department
#[utoipa::path(
    get,
    path = "/api/departments/{department_id}",
    params(("department_id", Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Departments",
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let department = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = $1")
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Department not found"))?;

    Ok(HttpResponse::Ok().json(department))
}

/// Create a department
#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = CreateDepartmentReq,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Name already taken")
    ),
    tag = "Departments",
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<CreateDepartmentReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut errors = FieldErrors::default();
    errors.required("name", &body.name, 100);
    errors.optional_max_len("description", body.description.as_deref(), 1000);
    errors.into_result()?;

    let department = sqlx::query_as::<_, Department>(
        r#"
        INSERT INTO departments (name, description, manager_id)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(body.manager_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) if body.manager_id.is_some() => {
            ApiError::conflict("Department name already exists or manager does not exist")
        }
        ApiError::Conflict(_) => ApiError::conflict("Department name already exists"),
        other => other,
    })?;

    info!(department_id = department.id, "Department created");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("department.create", "department", Some(department.id))
            .by(&auth)
            .details(json!({ "name": department.name })),
    )
    .await;

    Ok(HttpResponse::Created().json(department))
}

/// Update a department
#[utoipa::path(
    put,
    path = "/api/departments/{department_id}",
    params(("department_id", Path, description = "Department ID")),
    request_body(content = Object, example = json!({"description": "Platform and infrastructure"})),
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Departments",
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let department_id = path.into_inner();

    let update = build_update_sql("departments", &body, UPDATABLE_COLUMNS, department_id)?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        return Err(ApiError::not_found("Department not found"));
    }

    audit::record(
        pool.get_ref(),
        AuditEntry::new("department.update", "department", Some(department_id))
            .by(&auth)
            .details(body.into_inner()),
    )
    .await;

    let department = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = $1")
        .bind(department_id)
        .fetch_one(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(department))
}

/// Delete a department
///
/// Fails with 409 while users still belong to it.
#[utoipa::path(
    delete,
    path = "/api/departments/{department_id}",
    params(("department_id", Path, description = "Department ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Department still has members")
    ),
    tag = "Departments",
    security(("bearer_auth" = []))
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let department_id = path.into_inner();

    let result = sqlx::query("DELETE FROM departments WHERE id = $1")
        .bind(department_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Department still has members"),
            other => other,
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Department not found"));
    }

    info!(department_id, "Department deleted");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("department.delete", "department", Some(department_id)).by(&auth),
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}
