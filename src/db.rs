use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

fn connect_options(config: &Config) -> Result<PgConnectOptions> {
    let ssl_mode = PgSslMode::from_str(&config.db_ssl_mode)
        .with_context(|| format!("Invalid DB_SSL_MODE: {}", config.db_ssl_mode))?;

    let mut options = PgConnectOptions::from_str(&config.database_url)
        .context("Invalid DATABASE_URL")?
        .ssl_mode(ssl_mode);

    if let Some(cert) = &config.db_ssl_root_cert {
        options = options.ssl_root_cert(cert.as_str());
    }

    Ok(options)
}

fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
}

pub async fn init_db(config: &Config) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect_with(connect_options(config)?)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Database health check failed")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to apply migrations")?;
        info!("Database migrations applied");
    }

    Ok(pool)
}

/// Pool that only connects on first use; lets the router be built without a live database.
pub fn lazy_pool(config: &Config) -> Result<PgPool> {
    Ok(pool_options(config).connect_lazy_with(connect_options(config)?))
}
