use actix_web::HttpResponse;
use serde_json::json;

/// GET /health
///
/// Liveness only; no dependency checks.
pub async fn health_check() -> HttpResponse {
    tracing::debug!("Health check endpoint called");
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
