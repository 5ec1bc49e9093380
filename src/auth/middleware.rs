use crate::auth::auth::{AuthUser, client_ip};
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

fn reject(req: ServiceRequest, err: ApiError) -> Result<ServiceResponse<BoxBody>, Error> {
    debug!(path = %req.path(), reason = %err, "Rejected unauthenticated request");
    let resp = err.error_response();
    Ok(req.into_response(resp))
}

/// Resolves the bearer access token into an [`AuthUser`] stored in request extensions.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| ApiError::internal("App config missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => match h.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => {
                return reject(req, ApiError::unauthorized("Invalid Authorization header encoding"));
            }
        },
        None => return reject(req, ApiError::unauthorized("Missing Authorization header")),
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t.trim(),
        None => {
            return reject(
                req,
                ApiError::unauthorized("Authorization header must start with Bearer"),
            );
        }
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return reject(req, ApiError::unauthorized("Invalid or expired token")),
    };

    if claims.token_type != TokenType::Access {
        return reject(req, ApiError::unauthorized("Access token required"));
    }

    let ip = client_ip(req.request());
    req.extensions_mut().insert(AuthUser::from_claims(claims, ip));

    next.call(req).await
}
