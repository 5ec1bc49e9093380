use crate::{
    auth::{
        auth::{AuthUser, client_ip},
        jwt::{
            TokenSubject, generate_access_token, generate_mfa_challenge_token, generate_refresh_token,
            verify_token_of_type,
        },
        mfa,
        password::{hash_password, verify_dummy, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::user::{User, UserProfile},
    models::{
        ChangePasswordReq, ForgotPasswordReq, LoginReqDto, LoginResponse, MfaChallenge, MfaCodeReq,
        MfaDisableReq, MfaSetupResponse, MfaVerifyReq, RefreshReq, ResetPasswordReq, TokenPair, TokenType,
    },
    utils::{
        audit::{self, AuditEntry},
        otp_replay,
    },
    validation::{FieldErrors, normalize_email},
};
use actix_web::{HttpRequest, HttpResponse, web};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};

const RESET_TOKEN_TTL_MINUTES: i64 = 60;

impl From<&User> for TokenSubject {
    fn from(u: &User) -> Self {
        TokenSubject {
            user_id: u.id,
            email: u.email.clone(),
            role: u.role,
            department_id: u.department_id,
        }
    }
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    ApiError::internal(format!("Token generation failed: {e}"))
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

pub(crate) fn hash_reset_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn new_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_user_by_id(pool: &PgPool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Revokes every live refresh token of a user; returns how many were revoked.
pub(crate) async fn revoke_all_refresh_tokens(pool: &PgPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Issues an access/refresh pair and persists the refresh token's jti.
async fn issue_token_pair(pool: &PgPool, config: &Config, user: &User) -> ApiResult<TokenPair> {
    let subject = TokenSubject::from(user);

    let access_token =
        generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl).map_err(token_error)?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl).map_err(token_error)?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES ($1, $2, TO_TIMESTAMP($3))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as f64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_ttl,
    })
}

async fn complete_login(pool: &PgPool, config: &Config, user: &User, ip: Option<String>) -> ApiResult<TokenPair> {
    let pair = issue_token_pair(pool, config, user).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(pool)
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    audit::record(pool, AuditEntry::new("auth.login", "user", Some(user.id)).user(user.id).ip(ip)).await;

    Ok(pair)
}

/// Login with email + password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair, or an MFA challenge for accounts with MFA enabled", body = LoginResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(req, pool, config, body), fields(email = %body.email))]
pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginReqDto>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    let mut errors = FieldErrors::default();
    errors.email("email", &body.email);
    if body.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.into_result()?;

    let email = normalize_email(&body.email);

    let user = match find_user_by_email(pool.get_ref(), &email).await? {
        Some(u) if u.is_active => u,
        Some(_) => {
            verify_dummy(&body.password);
            info!("Invalid credentials: account inactive");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        None => {
            verify_dummy(&body.password);
            info!("Invalid credentials: user not found");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if let Err(e) = verify_password(&body.password, &user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    debug!(user_id = user.id, "Password verified");

    if user.mfa_enabled {
        let challenge_token = generate_mfa_challenge_token(
            &TokenSubject::from(&user),
            &config.jwt_secret,
            config.mfa_challenge_ttl,
        )
        .map_err(token_error)?;

        info!(user_id = user.id, "MFA challenge issued");

        return Ok(HttpResponse::Ok().json(LoginResponse::MfaRequired(MfaChallenge {
            mfa_required: true,
            challenge_token,
            expires_in: config.mfa_challenge_ttl,
        })));
    }

    let pair = complete_login(pool.get_ref(), &config, &user, client_ip(&req)).await?;
    info!(user_id = user.id, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse::Tokens(pair)))
}

/// Exchange an MFA challenge token and a TOTP code for the token pair
#[utoipa::path(
    post,
    path = "/auth/mfa/verify",
    request_body = MfaVerifyReq,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Invalid challenge or code")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_mfa_verify", skip_all)]
pub async fn verify_mfa(
    req: HttpRequest,
    body: web::Json<MfaVerifyReq>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.mfa_code("code", &body.code);
    if body.challenge_token.trim().is_empty() {
        errors.add("challenge_token", "Field is required");
    }
    errors.into_result()?;

    let claims = verify_token_of_type(&body.challenge_token, &config.jwt_secret, TokenType::MfaChallenge)
        .map_err(|_| ApiError::unauthorized("Invalid or expired challenge"))?;

    let user = match find_user_by_id(pool.get_ref(), claims.user_id).await? {
        Some(u) if u.is_active && u.mfa_enabled => u,
        _ => return Err(ApiError::unauthorized("Invalid or expired challenge")),
    };

    let secret = user
        .mfa_secret
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired challenge"))?;

    let step = mfa::verify_code(secret, &body.code, unix_now()).ok_or_else(|| {
        warn!(user_id = user.id, "Invalid MFA code");
        ApiError::unauthorized("Invalid MFA code")
    })?;

    if !otp_replay::try_consume(user.id, step).await {
        warn!(user_id = user.id, "MFA code replay rejected");
        return Err(ApiError::unauthorized("Invalid MFA code"));
    }

    let pair = complete_login(pool.get_ref(), &config, &user, client_ip(&req)).await?;
    info!(user_id = user.id, "MFA login successful");

    Ok(HttpResponse::Ok().json(pair))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshReq,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    body: web::Json<RefreshReq>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let claims = verify_token_of_type(&body.refresh_token, &config.jwt_secret, TokenType::Refresh)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let mut tx = pool.begin().await?;

    // find refresh token, lock it, revoke in the same transaction
    let record: Option<(i64, i64, bool)> = sqlx::query_as(
        r#"
        SELECT id, user_id, revoked
        FROM refresh_tokens
        WHERE jti = $1 AND expires_at > NOW()
        FOR UPDATE
        "#,
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        Some((_, user_id, true)) => {
            warn!(user_id, "Revoked refresh token presented");
            return Err(ApiError::unauthorized("Invalid refresh token"));
        }
        None => return Err(ApiError::unauthorized("Invalid refresh token")),
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    // role or activation may have changed since the token was issued
    let user = match find_user_by_id(pool.get_ref(), user_id).await? {
        Some(u) if u.is_active => u,
        _ => return Err(ApiError::unauthorized("Account is disabled")),
    };

    let pair = issue_token_pair(pool.get_ref(), &config, &user).await?;
    debug!(user_id, "Refresh token rotated");

    Ok(HttpResponse::Ok().json(pair))
}

/// Revoke a refresh token (idempotent)
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshReq,
    responses((status = 204, description = "Logged out")),
    tag = "Auth"
)]
pub async fn logout(
    body: web::Json<RefreshReq>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    // only refresh tokens can logout
    let claims = match verify_token_of_type(&body.refresh_token, &config.jwt_secret, TokenType::Refresh) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    // success even if token didn't exist
    HttpResponse::NoContent().finish()
}

/// Start a password reset
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = ForgotPasswordReq,
    responses(
        (status = 200, description = "Always returned, whether or not the account exists", body = Object,
         example = json!({"message": "If the account exists, a reset link has been sent"})),
        (status = 400, description = "Validation failed")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_forgot_password", skip_all)]
pub async fn forgot_password(
    body: web::Json<ForgotPasswordReq>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.email("email", &body.email);
    errors.into_result()?;

    let mut response = json!({
        "message": "If the account exists, a reset link has been sent"
    });

    let email = normalize_email(&body.email);
    let Some(user) = find_user_by_email(pool.get_ref(), &email).await?.filter(|u| u.is_active) else {
        debug!("Password reset requested for unknown or inactive account");
        return Ok(HttpResponse::Ok().json(response));
    };

    let token = new_reset_token();
    let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);

    sqlx::query(
        r#"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user.id)
    .bind(hash_reset_token(&token))
    .bind(expires_at)
    .execute(pool.get_ref())
    .await?;

    info!(user_id = user.id, "Password reset token issued");
    audit::record(pool.get_ref(), AuditEntry::new("auth.password_reset_requested", "user", Some(user.id))).await;

    if config.expose_reset_token {
        response["reset_token"] = json!(token);
    }

    Ok(HttpResponse::Ok().json(response))
}

/// Complete a password reset with the emailed token
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = ResetPasswordReq,
    responses(
        (status = 200, description = "Password updated", body = Object, example = json!({"message": "Password has been reset"})),
        (status = 400, description = "Validation failed or token invalid")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_reset_password", skip_all)]
pub async fn reset_password(body: web::Json<ResetPasswordReq>, pool: web::Data<PgPool>) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.password("new_password", &body.new_password);
    if body.token.trim().is_empty() {
        errors.add("token", "Field is required");
    }
    errors.into_result()?;

    let new_hash = hash_password(&body.new_password)
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {e}")))?;

    let mut tx = pool.begin().await?;

    let consumed: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE password_reset_tokens
        SET used_at = NOW()
        WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()
        RETURNING user_id
        "#,
    )
    .bind(hash_reset_token(body.token.trim()))
    .fetch_optional(&mut *tx)
    .await?;

    let Some((user_id,)) = consumed else {
        return Err(ApiError::bad_request("Invalid or expired reset token"));
    };

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&new_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(user_id, "Password reset completed");
    audit::record(pool.get_ref(), AuditEntry::new("auth.password_reset", "user", Some(user_id)).user(user_id)).await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password has been reset" })))
}

/// Change the current user's password
#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed", body = Object, example = json!({"message": "Password changed"})),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Current password is wrong")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_change_password", skip_all, fields(user_id = auth.user_id))]
pub async fn change_password(
    auth: AuthUser,
    body: web::Json<ChangePasswordReq>,
    pool: web::Data<PgPool>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.password("new_password", &body.new_password);
    if body.current_password.is_empty() {
        errors.add("current_password", "Field is required");
    } else if body.current_password == body.new_password {
        errors.add("new_password", "New password must differ from the current one");
    }
    errors.into_result()?;

    let user = find_user_by_id(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account not found"))?;

    if verify_password(&body.current_password, &user.password_hash).is_err() {
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let new_hash = hash_password(&body.new_password)
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {e}")))?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&new_hash)
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    let revoked = revoke_all_refresh_tokens(pool.get_ref(), user.id).await?;
    info!(revoked, "Password changed, sessions revoked");

    audit::record(pool.get_ref(), AuditEntry::new("auth.password_change", "user", Some(user.id)).by(&auth)).await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed" })))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Profile of the authenticated user", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<PgPool>) -> ApiResult<HttpResponse> {
    let user = find_user_by_id(pool.get_ref(), auth.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Account not found"))?;

    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// Generate a pending TOTP secret for the current user
#[utoipa::path(
    post,
    path = "/auth/mfa/setup",
    responses(
        (status = 200, description = "Secret and provisioning URI", body = MfaSetupResponse),
        (status = 409, description = "MFA already enabled")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn mfa_setup(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let user = find_user_by_id(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account not found"))?;

    if user.mfa_enabled {
        return Err(ApiError::conflict("MFA is already enabled"));
    }

    let secret = mfa::generate_secret();

    sqlx::query("UPDATE users SET mfa_secret = $1, updated_at = NOW() WHERE id = $2")
        .bind(&secret)
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    info!(user_id = user.id, "MFA setup started");

    Ok(HttpResponse::Ok().json(MfaSetupResponse {
        otpauth_url: mfa::otpauth_url(&config.mfa_issuer, &user.email, &secret),
        secret,
    }))
}

/// Confirm the pending secret with a first code and turn MFA on
#[utoipa::path(
    post,
    path = "/auth/mfa/enable",
    request_body = MfaCodeReq,
    responses(
        (status = 200, description = "MFA enabled", body = Object, example = json!({"message": "MFA enabled"})),
        (status = 400, description = "No pending setup or invalid code")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn mfa_enable(
    auth: AuthUser,
    body: web::Json<MfaCodeReq>,
    pool: web::Data<PgPool>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.mfa_code("code", &body.code);
    errors.into_result()?;

    let user = find_user_by_id(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account not found"))?;

    if user.mfa_enabled {
        return Err(ApiError::conflict("MFA is already enabled"));
    }

    let secret = user
        .mfa_secret
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Run MFA setup first"))?;

    let step = mfa::verify_code(secret, &body.code, unix_now())
        .ok_or_else(|| ApiError::bad_request("Invalid MFA code"))?;
    if !otp_replay::try_consume(user.id, step).await {
        return Err(ApiError::bad_request("Invalid MFA code"));
    }

    sqlx::query("UPDATE users SET mfa_enabled = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    info!(user_id = user.id, "MFA enabled");
    audit::record(pool.get_ref(), AuditEntry::new("auth.mfa_enable", "user", Some(user.id)).by(&auth)).await;

    Ok(HttpResponse::Ok().json(json!({ "message": "MFA enabled" })))
}

/// Turn MFA off; requires the password and a current code
#[utoipa::path(
    post,
    path = "/auth/mfa/disable",
    request_body = MfaDisableReq,
    responses(
        (status = 200, description = "MFA disabled", body = Object, example = json!({"message": "MFA disabled"})),
        (status = 400, description = "MFA not enabled or validation failed"),
        (status = 401, description = "Wrong password or code")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn mfa_disable(
    auth: AuthUser,
    body: web::Json<MfaDisableReq>,
    pool: web::Data<PgPool>,
) -> ApiResult<HttpResponse> {
    let mut errors = FieldErrors::default();
    errors.mfa_code("code", &body.code);
    if body.password.is_empty() {
        errors.add("password", "Field is required");
    }
    errors.into_result()?;

    let user = find_user_by_id(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account not found"))?;

    let secret = match (user.mfa_enabled, user.mfa_secret.as_deref()) {
        (true, Some(secret)) => secret,
        _ => return Err(ApiError::bad_request("MFA is not enabled")),
    };

    if verify_password(&body.password, &user.password_hash).is_err() {
        return Err(ApiError::unauthorized("Invalid password"));
    }

    let step = mfa::verify_code(secret, &body.code, unix_now())
        .ok_or_else(|| ApiError::unauthorized("Invalid MFA code"))?;
    if !otp_replay::try_consume(user.id, step).await {
        return Err(ApiError::unauthorized("Invalid MFA code"));
    }

    sqlx::query("UPDATE users SET mfa_enabled = FALSE, mfa_secret = NULL, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    otp_replay::forget(user.id).await;

    info!(user_id = user.id, "MFA disabled");
    audit::record(pool.get_ref(), AuditEntry::new("auth.mfa_disable", "user", Some(user.id)).by(&auth)).await;

    Ok(HttpResponse::Ok().json(json!({ "message": "MFA disabled" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_token_hash_is_hex_sha256() {
        let hash = hash_reset_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reset_tokens_are_url_safe_and_unique() {
        let a = new_reset_token();
        let b = new_reset_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
