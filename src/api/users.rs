use crate::{
    auth::{
        auth::{AuthUser, HR_STAFF},
        handlers::revoke_all_refresh_tokens,
        password::hash_password,
    },
    error::{ApiError, ApiResult},
    model::{
        role::Role,
        user::{USER_PROFILE_COLUMNS, UserProfile},
    },
    utils::{
        audit::{self, AuditEntry},
        db_utils::{Column, ColumnKind, Filters, SqlValue, as_object, build_update_sql, execute_update, fetch_page},
        pagination::{Page, PaginatedUsers},
    },
    validation::{FieldErrors, normalize_email},
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

const NAME_MAX_LEN: usize = 100;

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::required("first_name", ColumnKind::Text),
    Column::required("last_name", ColumnKind::Text),
    Column::required("role", ColumnKind::OneOf(Role::NAMES)),
    Column::nullable("department_id", ColumnKind::BigInt),
    Column::required("is_active", ColumnKind::Bool),
];

#[derive(Deserialize, ToSchema)]
pub struct CreateUserReq {
    #[schema(example = "new.hire@teamhub.io")]
    pub email: String,
    #[schema(example = "Welcome2026")]
    pub password: String,
    #[schema(example = "Luis")]
    pub first_name: String,
    #[schema(example = "Pérez")]
    pub last_name: String,
    /// Defaults to `employee`
    pub role: Option<Role>,
    pub department_id: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub role: Option<Role>,
    pub department_id: Option<i64>,
    pub is_active: Option<bool>,
    /// Matches first name, last name or email
    pub search: Option<String>,
}

async fn fetch_profile(pool: &PgPool, id: i64) -> ApiResult<UserProfile> {
    let sql = format!("SELECT {USER_PROFILE_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, UserProfile>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Granting or revoking admin is reserved to admins.
fn check_role_change(auth: &AuthUser, current: Role, requested: Option<Role>) -> ApiResult<()> {
    let touches_admin = match requested {
        Some(next) if next != current => next == Role::Admin || current == Role::Admin,
        _ => false,
    };

    if touches_admin && !auth.is_admin() {
        return Err(ApiError::forbidden("Only administrators can grant or revoke the admin role"));
    }
    Ok(())
}

fn validate_create(body: &CreateUserReq) -> ApiResult<()> {
    let mut errors = FieldErrors::default();
    errors.email("email", &body.email);
    errors.password("password", &body.password);
    errors.required("first_name", &body.first_name, NAME_MAX_LEN);
    errors.required("last_name", &body.last_name, NAME_MAX_LEN);
    errors.into_result()
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Paginated user list", body = PaginatedUsers),
        (status = 403, description = "Forbidden")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<UserListQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let page = Page::resolve(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(role) = query.role {
        filters.eq("role", SqlValue::String(role.to_string()));
    }
    if let Some(department_id) = query.department_id {
        filters.eq("department_id", SqlValue::I64(department_id));
    }
    if let Some(is_active) = query.is_active {
        filters.eq("is_active", SqlValue::Bool(is_active));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        filters.search(&["first_name", "last_name", "email"], search);
    }

    let (users, total) =
        fetch_page::<UserProfile>(pool.get_ref(), USER_PROFILE_COLUMNS, "users", &filters, "id DESC", page)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list users");
                ApiError::from(e)
            })?;

    let body: PaginatedUsers = page.wrap(users, total);
    Ok(HttpResponse::Ok().json(body))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<CreateUserReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    validate_create(&body)?;

    let role = body.role.unwrap_or(Role::Employee);
    if role == Role::Admin && !auth.is_admin() {
        return Err(ApiError::forbidden("Only administrators can create admin users"));
    }

    let password_hash =
        hash_password(&body.password).map_err(|e| ApiError::internal(format!("Password hashing failed: {e}")))?;

    let sql = format!(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, role, department_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_PROFILE_COLUMNS}
        "#
    );

    let created = sqlx::query_as::<_, UserProfile>(&sql)
        .bind(normalize_email(&body.email))
        .bind(&password_hash)
        .bind(body.first_name.trim())
        .bind(body.last_name.trim())
        .bind(role.as_ref())
        .bind(body.department_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Email is already registered"),
            other => other,
        })?;

    info!(user_id = created.id, role = %role, by = auth.user_id, "User created");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("user.create", "user", Some(created.id))
            .by(&auth)
            .details(json!({ "email": created.email, "role": role })),
    )
    .await;

    Ok(HttpResponse::Created().json(created))
}

/// Get a user
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserProfile),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(auth: AuthUser, pool: web::Data<PgPool>, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_roles(user_id, HR_STAFF)?;

    let user = fetch_profile(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Update a user
///
/// Partial update; accepted fields are `first_name`, `last_name`, `role`,
/// `department_id` and `is_active`.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    request_body(content = Object, example = json!({"role": "manager", "department_id": 3})),
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let user_id = path.into_inner();

    let obj = as_object(&body)?;
    let requested_role = obj.get("role").and_then(Value::as_str).and_then(|r| r.parse::<Role>().ok());
    let deactivating = obj.get("is_active") == Some(&Value::Bool(false));

    if deactivating && user_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let update = build_update_sql("users", &body, UPDATABLE_COLUMNS, user_id)?;

    let current = fetch_profile(pool.get_ref(), user_id).await?;
    check_role_change(&auth, current.role, requested_role)?;
    if deactivating && current.role == Role::Admin && !auth.is_admin() {
        return Err(ApiError::forbidden("Only administrators can deactivate admin users"));
    }

    let affected = execute_update(pool.get_ref(), update).await?;
    if affected == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    if deactivating {
        revoke_all_refresh_tokens(pool.get_ref(), user_id).await?;
    }

    info!(user_id, by = auth.user_id, "User updated");
    audit::record(
        pool.get_ref(),
        AuditEntry::new("user.update", "user", Some(user_id))
            .by(&auth)
            .details(body.into_inner()),
    )
    .await;

    let updated = fetch_profile(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Deactivate a user
///
/// Users are never hard-deleted; their sessions are revoked.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = Object, example = json!({"message": "User deactivated"})),
        (status = 400, description = "Cannot deactivate yourself"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn deactivate_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    if user_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let result = sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    let revoked = revoke_all_refresh_tokens(pool.get_ref(), user_id).await?;
    info!(user_id, revoked, by = auth.user_id, "User deactivated");

    audit::record(pool.get_ref(), AuditEntry::new("user.deactivate", "user", Some(user_id)).by(&auth)).await;

    Ok(HttpResponse::Ok().json(json!({ "message": "User deactivated" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "caller@teamhub.io".to_string(),
            role,
            department_id: None,
            ip: None,
        }
    }

    #[test]
    fn only_admin_touches_the_admin_role() {
        let hr = caller(Role::Rrhh);
        let admin = caller(Role::Admin);

        assert!(check_role_change(&hr, Role::Employee, Some(Role::Manager)).is_ok());
        assert!(check_role_change(&hr, Role::Employee, Some(Role::Admin)).is_err());
        assert!(check_role_change(&hr, Role::Admin, Some(Role::Employee)).is_err());
        assert!(check_role_change(&hr, Role::Admin, Some(Role::Admin)).is_ok());
        assert!(check_role_change(&hr, Role::Admin, None).is_ok());
        assert!(check_role_change(&admin, Role::Employee, Some(Role::Admin)).is_ok());
    }

    #[test]
    fn create_reports_all_invalid_fields() {
        let body = CreateUserReq {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            first_name: " ".to_string(),
            last_name: "Ok".to_string(),
            role: None,
            department_id: None,
        };

        match validate_create(&body) {
            Err(ApiError::Validation(fields)) => {
                assert!(fields.has("email"));
                assert!(fields.has("password"));
                assert!(fields.has("first_name"));
                assert!(!fields.has("last_name"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
