use crate::{
    api::{
        audit_logs, dashboard, departments, error_logs, health, processes, projects, tasks, templates,
        time_tracking, users,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::ApiError,
    validation::from_deserialize_message,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{
    HttpRequest,
    error::{JsonPayloadError, PathError, QueryPayloadError},
    middleware::from_fn,
    web,
};
use std::sync::Arc;
use tracing::warn;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            warn!(requests_per_min, "Invalid rate limit, using defaults");
            GovernorConfig::default()
        });

    Governor::new(&cfg)
}

// Extractor failures answer with the same 400 body as handler validation.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let api_error = match err {
        JsonPayloadError::Deserialize(e) => ApiError::Validation(from_deserialize_message("body", &e.to_string())),
        other => ApiError::bad_request(other.to_string()),
    };
    api_error.into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let api_error = match err {
        QueryPayloadError::Deserialize(e) => ApiError::Validation(from_deserialize_message("query", &e.to_string())),
        other => ApiError::bad_request(other.to_string()),
    };
    api_error.into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    let api_error = match err {
        PathError::Deserialize(e) => ApiError::Validation(from_deserialize_message("path", &e.to_string())),
        other => ApiError::bad_request(other.to_string()),
    };
    api_error.into()
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error));

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.route("/health", web::get().to(health::health));

    // Error intake accepts anonymous reports, so it sits outside the protected scope.
    cfg.service(
        web::resource(format!("{}/errors", config.api_prefix))
            .wrap(protected_limiter.clone())
            .route(web::post().to(error_logs::report_error))
            .route(web::get().to(error_logs::list_errors)),
    );

    cfg.service(
        web::scope("/auth")
            // public
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/mfa/verify")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::verify_mfa)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/password/forgot")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::forgot_password)),
            )
            .service(
                web::resource("/password/reset")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::reset_password)),
            )
            // authenticated
            .service(
                web::resource("/password/change")
                    .wrap(from_fn(auth_middleware))
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::change_password)),
            )
            .service(
                web::resource("/me")
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter.clone())
                    .route(web::get().to(handlers::me)),
            )
            .service(
                web::scope("/mfa")
                    .wrap(from_fn(auth_middleware))
                    .wrap(login_limiter.clone())
                    .route("/setup", web::post().to(handlers::mfa_setup))
                    .route("/enable", web::post().to(handlers::mfa_enable))
                    .route("/disable", web::post().to(handlers::mfa_disable)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::get().to(users::list_users))
                            .route(web::post().to(users::create_user)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(users::get_user))
                            .route(web::put().to(users::update_user))
                            .route(web::delete().to(users::deactivate_user)),
                    ),
            )
            .service(
                web::scope("/departments")
                    .service(
                        web::resource("")
                            .route(web::get().to(departments::list_departments))
                            .route(web::post().to(departments::create_department)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(departments::get_department))
                            .route(web::put().to(departments::update_department))
                            .route(web::delete().to(departments::delete_department)),
                    ),
            )
            .service(
                web::scope("/templates")
                    .service(
                        web::resource("")
                            .route(web::get().to(templates::list_templates))
                            .route(web::post().to(templates::create_template)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(templates::get_template))
                            .route(web::put().to(templates::update_template))
                            .route(web::delete().to(templates::delete_template)),
                    ),
            )
            .service(
                web::scope("/processes")
                    .service(
                        web::resource("")
                            .route(web::get().to(processes::list_processes))
                            .route(web::post().to(processes::create_process)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(processes::get_process)))
                    .service(
                        web::resource("/{id}/status").route(web::put().to(processes::update_process_status)),
                    )
                    .service(
                        web::resource("/{id}/tasks/{task_id}/complete")
                            .route(web::post().to(processes::complete_process_task)),
                    ),
            )
            .service(
                web::scope("/projects")
                    .service(
                        web::resource("")
                            .route(web::get().to(projects::list_projects))
                            .route(web::post().to(projects::create_project)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(projects::get_project))
                            .route(web::put().to(projects::update_project))
                            .route(web::delete().to(projects::delete_project)),
                    )
                    .service(
                        web::resource("/{id}/tasks")
                            .route(web::get().to(tasks::list_project_tasks))
                            .route(web::post().to(tasks::create_task)),
                    ),
            )
            .service(
                web::resource("/tasks/{id}")
                    .route(web::get().to(tasks::get_task))
                    .route(web::put().to(tasks::update_task))
                    .route(web::delete().to(tasks::delete_task)),
            )
            .service(
                web::scope("/time-entries")
                    .service(
                        web::resource("")
                            .route(web::get().to(time_tracking::list_time_entries))
                            .route(web::post().to(time_tracking::create_time_entry)),
                    )
                    // before /{id}
                    .service(web::resource("/summary").route(web::get().to(time_tracking::time_summary)))
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(time_tracking::update_time_entry))
                            .route(web::delete().to(time_tracking::delete_time_entry)),
                    )
                    .service(
                        web::resource("/{id}/approve").route(web::post().to(time_tracking::approve_time_entry)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::post().to(time_tracking::reject_time_entry)),
                    ),
            )
            .service(
                web::scope("/dashboard")
                    .route("", web::get().to(dashboard::my_dashboard))
                    .route("/admin", web::get().to(dashboard::admin_dashboard))
                    .route("/rrhh", web::get().to(dashboard::rrhh_dashboard))
                    .route("/manager", web::get().to(dashboard::manager_dashboard))
                    .route("/employee", web::get().to(dashboard::employee_dashboard)),
            )
            .route("/audit-logs", web::get().to(audit_logs::list_audit_logs)),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  ├─ refresh_token (7 days)
//  └─ or mfa challenge (5 min) ─ POST /auth/mfa/verify with TOTP code

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, old refresh token revoked
