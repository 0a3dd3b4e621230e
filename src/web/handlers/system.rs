use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;

use crate::web::models::{ErrorResponse, GenericResponse, HealthResponse, MetricsQuery};
use crate::web::server::AppState;

/// Liveness and registry overview
pub async fn health(data: web::Data<AppState>) -> impl Responder {
    let orchestrator = &data.orchestrator;
    let started_at = orchestrator.started_at();

    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: (Utc::now() - started_at).num_seconds().max(0) as u64,
        version: env!("CARGO_PKG_VERSION").to_string(),
        organizations: orchestrator.organizations().len(),
        algorithms: orchestrator.algorithms(),
        started_at,
    };

    HttpResponse::Ok().json(response)
}

/// Run metrics summary, optionally with the most recent runs
pub async fn metrics(data: web::Data<AppState>, query: web::Query<MetricsQuery>) -> impl Responder {
    let manager = data.orchestrator.metrics();
    let summary = manager.summary().await;
    let recent = match query.recent {
        Some(limit) => manager.recent(limit).await,
        None => Vec::new(),
    };

    HttpResponse::Ok().json(GenericResponse {
        success: true,
        message: format!("{} runs recorded", summary.total_runs),
        data: Some(serde_json::json!({
            "summary": summary,
            "recent": recent,
        })),
    })
}

pub async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(ErrorResponse::new("Resource not found", "NOT_FOUND"))
}
