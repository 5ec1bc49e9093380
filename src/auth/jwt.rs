use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

/// Identity baked into every token issued for a user.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

pub fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

pub fn generate_token(
    subject: &TokenSubject,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.email.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        department_id: subject.department_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn generate_access_token(subject: &TokenSubject, secret: &str, ttl: usize) -> Result<String, Error> {
    generate_token(subject, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(
    subject: &TokenSubject,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    generate_token(subject, TokenType::Refresh, secret, ttl)
}

pub fn generate_mfa_challenge_token(subject: &TokenSubject, secret: &str, ttl: usize) -> Result<String, Error> {
    generate_token(subject, TokenType::MfaChallenge, secret, ttl).map(|(token, _)| token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

/// Verifies the signature and expiry, then insists on the expected token type.
pub fn verify_token_of_type(token: &str, secret: &str, expected: TokenType) -> Result<Claims, String> {
    let claims = verify_token(token, secret)?;
    if claims.token_type != expected {
        return Err(format!("Expected {expected:?} token, got {:?}", claims.token_type));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret-test-secret";

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 42,
            email: "ana.garcia@teamhub.io".to_string(),
            role: Role::Manager,
            department_id: Some(3),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let token = generate_access_token(&subject(), SECRET, 900).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "ana.garcia@teamhub.io");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.department_id, Some(3));
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(claims.exp > now());
    }

    #[test]
    fn each_token_gets_a_unique_jti() {
        let (_, a) = generate_refresh_token(&subject(), SECRET, 60).unwrap();
        let (_, b) = generate_refresh_token(&subject(), SECRET, 60).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token(&subject(), SECRET, 900).unwrap();
        assert!(verify_token(&token, "another-secret-another-secret-xx").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let (_, mut claims) = generate_refresh_token(&subject(), SECRET, 60).unwrap();
        // past the default 60 s leeway
        claims.exp = now() - 600;
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_token(&token, SECRET).is_err());
    }

    #[test]
    fn token_type_is_enforced() {
        let (refresh, _) = generate_refresh_token(&subject(), SECRET, 60).unwrap();
        let challenge = generate_mfa_challenge_token(&subject(), SECRET, 60).unwrap();

        assert!(verify_token_of_type(&refresh, SECRET, TokenType::Refresh).is_ok());
        assert!(verify_token_of_type(&refresh, SECRET, TokenType::Access).is_err());
        assert!(verify_token_of_type(&challenge, SECRET, TokenType::Access).is_err());
        assert!(verify_token_of_type(&challenge, SECRET, TokenType::MfaChallenge).is_ok());
    }
}
