use actix_web::{web, HttpResponse, Responder};
use log::error;

use crate::web::models::{ErrorResponse, GenericResponse};
use crate::web::server::AppState;

/// List the simulated organizations
pub async fn list_organizations(data: web::Data<AppState>) -> impl Responder {
    let organizations = data.orchestrator.organizations();

    match serde_json::to_value(&organizations) {
        Ok(value) => HttpResponse::Ok().json(GenericResponse {
            success: true,
            message: format!("{} organizations", organizations.len()),
            data: Some(value),
        }),
        Err(e) => {
            error!("Failed to serialize organizations: {:?}", e);
            HttpResponse::InternalServerError().json(ErrorResponse::new(
                format!("Failed to serialize organizations: {}", e),
                "SERIALIZATION_FAILED",
            ))
        }
    }
}

/// The collaboration all organizations belong to
pub async fn get_collaboration(data: web::Data<AppState>) -> impl Responder {
    let collaboration = data.orchestrator.collaboration();

    HttpResponse::Ok().json(GenericResponse {
        success: true,
        message: collaboration.name.clone(),
        data: serde_json::to_value(&collaboration).ok(),
    })
}
