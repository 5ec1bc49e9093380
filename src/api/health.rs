use actix_web::{HttpResponse, web};
use serde_json::json;
use sqlx::PgPool;
use tracing::error;

/// Liveness plus a database round trip
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database reachable", body = Object, example = json!({"status": "ok"})),
        (status = 503, description = "Database unreachable", body = Object, example = json!({"status": "unavailable"}))
    ),
    tag = "Health"
)]
pub async fn health(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            error!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}
