use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_ssl_mode: String,
    pub db_ssl_root_cert: Option<String>,
    pub run_migrations: bool,

    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub mfa_challenge_ttl: usize,
    pub mfa_issuer: String,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_level: String,
    pub log_dir: String,
    pub error_report_url: Option<String>,
    pub environment: String,
    pub expose_reset_token: bool,

    /// Staleness windows (seconds) advertised through Cache-Control
    pub cache_short_secs: u32,
    pub cache_medium_secs: u32,
    pub cache_long_secs: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 bytes long");
        }

        Ok(Self {
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            db_ssl_mode: lookup("DB_SSL_MODE").unwrap_or_else(|| "prefer".to_string()),
            db_ssl_root_cert: lookup("DB_SSL_ROOT_CERT"),
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,

            jwt_secret,
            access_token_ttl: parse_or(&lookup, "ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parse_or(&lookup, "REFRESH_TOKEN_TTL", 604_800)?, // 7 days
            mfa_challenge_ttl: parse_or(&lookup, "MFA_CHALLENGE_TTL", 300)?,
            mfa_issuer: lookup("MFA_ISSUER").unwrap_or_else(|| "TeamHub".to_string()),

            rate_login_per_min: parse_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parse_or(&lookup, "RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            error_report_url: lookup("ERROR_REPORT_URL").filter(|u| !u.trim().is_empty()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            expose_reset_token: parse_or(&lookup, "EXPOSE_RESET_TOKEN", false)?,

            cache_short_secs: parse_or(&lookup, "CACHE_SHORT_SECS", 30)?,
            cache_medium_secs: parse_or(&lookup, "CACHE_MEDIUM_SECS", 300)?,
            cache_long_secs: parse_or(&lookup, "CACHE_LONG_SECS", 1800)?,
        })
    }

    pub fn tracing_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.log_level).unwrap_or(tracing::Level::INFO)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply_when_optional_keys_are_missing() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/teamhub"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap();

        assert_eq!(config.server_addr, "0.0.0.0:8080");
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.refresh_token_ttl, 604_800);
        assert_eq!(config.api_prefix, "/api");
        assert!(config.run_migrations);
        assert!(!config.expose_reset_token);
        assert!(config.error_report_url.is_none());
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", SECRET)])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/teamhub"),
            ("JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn invalid_number_is_reported_with_its_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/teamhub"),
            ("JWT_SECRET", SECRET),
            ("ACCESS_TOKEN_TTL", "fifteen"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_TTL"));
    }

    #[test]
    fn blank_error_report_url_is_treated_as_unset() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/teamhub"),
            ("JWT_SECRET", SECRET),
            ("ERROR_REPORT_URL", "  "),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert!(config.error_report_url.is_none());
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
    }
}
