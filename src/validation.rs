//! Request-shape checks that run before any handler touches the database.
//!
//! Validators accumulate into [`FieldErrors`] so the client gets every failing
//! field in one 400 response.

use crate::error::ApiError;
use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const EMAIL_MAX_LEN: usize = 254;
pub const MFA_CODE_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct FieldError {
    #[schema(example = "email")]
    pub field: String,
    #[schema(example = "Invalid email format")]
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing failed, otherwise a 400 carrying every failure.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if let Err(msg) = check_email(value) {
            self.add(field, msg);
        }
    }

    pub fn password(&mut self, field: &str, value: &str) {
        if let Err(msg) = check_password(value) {
            self.add(field, msg);
        }
    }

    pub fn mfa_code(&mut self, field: &str, value: &str) {
        if !is_mfa_code(value) {
            self.add(field, "Code must be exactly 6 digits");
        }
    }

    pub fn required(&mut self, field: &str, value: &str, max_len: usize) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.add(field, "Field is required");
        } else if trimmed.chars().count() > max_len {
            self.add(field, format!("Must be at most {max_len} characters"));
        }
    }

    pub fn optional_max_len(&mut self, field: &str, value: Option<&str>, max_len: usize) {
        if let Some(v) = value {
            if v.chars().count() > max_len {
                self.add(field, format!("Must be at most {max_len} characters"));
            }
        }
    }

    pub fn date_order(&mut self, field: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                self.add(field, "End date cannot be before start date");
            }
        }
    }
}

/// Lowercases and trims an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_email(email: &str) -> Result<(), &'static str> {
    let email = email.trim();

    if email.is_empty() {
        return Err("Email is required");
    }
    if email.len() > EMAIL_MAX_LEN {
        return Err("Email is too long");
    }
    if email.chars().any(char::is_whitespace) {
        return Err("Invalid email format");
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err("Invalid email format"),
    };

    if local.is_empty() || domain.is_empty() {
        return Err("Invalid email format");
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err("Invalid email format");
    }

    Ok(())
}

pub fn check_password(password: &str) -> Result<(), &'static str> {
    let len = password.chars().count();

    if len < PASSWORD_MIN_LEN {
        return Err("Password must be at least 8 characters");
    }
    if len > PASSWORD_MAX_LEN {
        return Err("Password must be at most 128 characters");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit");
    }

    Ok(())
}

pub fn is_mfa_code(code: &str) -> bool {
    code.len() == MFA_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

/// Turns a serde deserialize message into a field error.
/// `missing field` / `unknown field` name the field; anything else lands on `fallback`.
pub fn from_deserialize_message(fallback: &str, message: &str) -> FieldErrors {
    // serde_json appends the position, which means nothing to API clients
    let message = message.split(" at line ").next().unwrap_or(message).trim();

    let named = |prefix: &str| {
        message
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('`'))
            .and_then(|rest| rest.split('`').next())
            .filter(|name| !name.is_empty())
    };

    let mut errors = FieldErrors::default();
    if let Some(field) = named("missing field ") {
        errors.add(field, "Field is required");
    } else if let Some(field) = named("unknown field ") {
        errors.add(field, "Unknown field");
    } else {
        errors.add(fallback, message);
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_emails() {
        assert!(check_email("ana.garcia@teamhub.io").is_ok());
        assert!(check_email("  Ana@Example.COM ").is_ok());
        assert!(check_email("a+tag@sub.example.org").is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        for bad in ["", "plain", "@example.com", "ana@", "ana@localhost", "a@b@c.com", "ana @x.com", "ana@x..com"] {
            assert!(check_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn normalizes_email_case_and_whitespace() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }

    #[test]
    fn password_policy() {
        assert!(check_password("Sup3rSecret").is_ok());
        assert_eq!(check_password("Sh0rt"), Err("Password must be at least 8 characters"));
        assert_eq!(check_password("alllowercase1"), Err("Password must contain an uppercase letter"));
        assert_eq!(check_password("ALLUPPERCASE1"), Err("Password must contain a lowercase letter"));
        assert_eq!(check_password("NoDigitsHere"), Err("Password must contain a digit"));
        assert!(check_password(&format!("Aa1{}", "x".repeat(126))).is_err());
    }

    #[test]
    fn mfa_code_format() {
        assert!(is_mfa_code("012345"));
        assert!(!is_mfa_code("12345"));
        assert!(!is_mfa_code("1234567"));
        assert!(!is_mfa_code("12a456"));
        assert!(!is_mfa_code("١٢٣٤٥٦"));
    }

    #[test]
    fn collects_every_failing_field() {
        let mut errors = FieldErrors::default();
        errors.email("email", "nope");
        errors.password("password", "weak");
        errors.required("first_name", "   ", 100);
        errors.mfa_code("code", "12");

        assert_eq!(errors.as_slice().len(), 4);
        assert!(errors.has("email"));
        assert!(errors.has("first_name"));
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn date_order_only_checks_when_both_present() {
        let d1 = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let mut errors = FieldErrors::default();
        errors.date_order("end_date", Some(d1), None);
        errors.date_order("end_date", Some(d2), Some(d1));
        assert!(errors.is_empty());

        errors.date_order("end_date", Some(d1), Some(d2));
        assert!(errors.has("end_date"));
    }

    #[test]
    fn deserialize_messages_name_the_field_when_serde_does() {
        let missing = from_deserialize_message("body", "missing field `email` at line 1 column 2");
        assert_eq!(missing.as_slice()[0].field, "email");
        assert_eq!(missing.as_slice()[0].message, "Field is required");

        let unknown = from_deserialize_message("query", "unknown field `colour`, expected one of `page`");
        assert_eq!(unknown.as_slice()[0].field, "colour");

        let typed = from_deserialize_message(
            "body",
            "invalid type: string \"ten\", expected f64 at line 1 column 30",
        );
        assert_eq!(typed.as_slice()[0].field, "body");
        assert_eq!(typed.as_slice()[0].message, "invalid type: string \"ten\", expected f64");
    }
}
