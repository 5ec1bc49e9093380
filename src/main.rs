use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use teamhub::config::Config;
use teamhub::db::init_db;
use teamhub::docs::ApiDoc;
use teamhub::routes;
use teamhub::utils::error_reporter::{self, ErrorReporter};
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "teamhub.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking.and(std::io::stdout))
        .with_max_level(config.tracing_level())
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(environment = %config.environment, "Server starting...");

    let pool = init_db(&config).await?;

    if let Some(url) = &config.error_report_url {
        error_reporter::install(ErrorReporter::new(url.clone(), config.environment.clone()));
        info!("Error reporter installed");
    }

    let server_addr = config.server_addr.clone();
    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} matches the UI's JS/CSS assets
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", openapi.clone()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
