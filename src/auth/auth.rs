use crate::auth::jwt::verify_token_of_type;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

/// Role sets used by route handlers.
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const HR_STAFF: &[Role] = &[Role::Admin, Role::Rrhh];
pub const MANAGERS: &[Role] = &[Role::Admin, Role::Manager];
pub const STAFF_AND_MANAGERS: &[Role] = &[Role::Admin, Role::Rrhh, Role::Manager];
pub const EVERYONE: &[Role] = &[Role::Admin, Role::Rrhh, Role::Manager, Role::Employee];

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub department_id: Option<i64>,
    /// Client address as seen by the server (proxy-aware)
    pub ip: Option<String>,
}

impl AuthUser {
    pub fn from_claims(claims: Claims, ip: Option<String>) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.sub,
            role: claims.role,
            department_id: claims.department_id,
            ip,
        }
    }

    /// 403 unless the caller's role is one of `allowed`.
    pub fn require_roles(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Role '{}' is not allowed to perform this action",
                self.role
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require_roles(ADMIN_ONLY)
    }

    pub fn require_hr_or_admin(&self) -> Result<(), ApiError> {
        self.require_roles(HR_STAFF)
    }

    /// Staff roles, or the user acting on their own record.
    pub fn require_self_or_roles(&self, user_id: i64, allowed: &[Role]) -> Result<(), ApiError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require_roles(allowed)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_hr_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Returns true if the user is a plain employee
    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(|addr| addr.to_string())
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    // Already resolved by the auth middleware
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = bearer_token(req).ok_or_else(|| ApiError::unauthorized("Missing token"))?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| ApiError::internal("Config missing"))?;

    let claims = verify_token_of_type(token, &config.jwt_secret, TokenType::Access)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    Ok(AuthUser::from_claims(claims, client_ip(req)))
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

/// Like [`AuthUser`] but never rejects; used by endpoints that also serve anonymous callers.
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequest for MaybeAuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(MaybeAuthUser(authenticate(req).ok())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 5,
            email: "someone@teamhub.io".to_string(),
            role,
            department_id: None,
            ip: None,
        }
    }

    #[test]
    fn gate_passes_iff_role_is_listed() {
        let sets = [ADMIN_ONLY, HR_STAFF, MANAGERS, STAFF_AND_MANAGERS, EVERYONE];
        for role in [Role::Admin, Role::Rrhh, Role::Manager, Role::Employee] {
            for set in sets {
                assert_eq!(user(role).require_roles(set).is_ok(), set.contains(&role));
            }
        }
    }

    #[test]
    fn mismatch_is_forbidden() {
        let err = user(Role::Employee).require_hr_or_admin().unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn self_access_bypasses_role_check() {
        assert!(user(Role::Employee).require_self_or_roles(5, HR_STAFF).is_ok());
        assert!(user(Role::Employee).require_self_or_roles(6, HR_STAFF).is_err());
        assert!(user(Role::Rrhh).require_self_or_roles(6, HR_STAFF).is_ok());
    }
}
