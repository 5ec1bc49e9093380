use crate::model::role::Role;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "ana.garcia@teamhub.io")]
    pub email: String,
    #[schema(example = "Sup3rSecret")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct MfaVerifyReq {
    pub challenge_token: String,
    #[schema(example = "492039")]
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshReq {
    pub refresh_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordReq {
    #[schema(example = "ana.garcia@teamhub.io")]
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordReq {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct MfaCodeReq {
    #[schema(example = "492039")]
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct MfaDisableReq {
    pub password: String,
    #[schema(example = "492039")]
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: usize,
}

/// Either the final token pair or, for MFA accounts, a challenge to answer.
#[derive(Serialize, Debug, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPair),
    MfaRequired(MfaChallenge),
}

#[derive(Serialize, Debug, ToSchema)]
pub struct MfaChallenge {
    pub mfa_required: bool,
    pub challenge_token: String,
    #[schema(example = 300)]
    pub expires_in: usize,
}

#[derive(Serialize, ToSchema)]
pub struct MfaSetupResponse {
    #[schema(example = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP")]
    pub secret: String,
    #[schema(example = "otpauth://totp/TeamHub:ana.garcia%40teamhub.io?secret=JBSWY3DPEHPK3PXP&issuer=TeamHub&algorithm=SHA1&digits=6&period=30")]
    pub otpauth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    /// Email of the subject
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
    MfaChallenge,
}
