use actix_web::{web, HttpResponse, Responder};
use log::{error, info};

use crate::core::orchestrator::OrchestratorError;
use crate::core::task::TaskRequest;
use crate::web::models::{ErrorResponse, GenericResponse};
use crate::web::server::AppState;

fn error_response(e: &OrchestratorError) -> HttpResponse {
    match e {
        OrchestratorError::UnknownMethod(_) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string(), "UNKNOWN_METHOD"))
        }
        OrchestratorError::NoOrganizations => {
            HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string(), "NO_ORGANIZATIONS"))
        }
        OrchestratorError::UnknownOrganization(_) => HttpResponse::BadRequest()
            .json(ErrorResponse::new(e.to_string(), "UNKNOWN_ORGANIZATION")),
        OrchestratorError::TaskNotFound(_) => {
            HttpResponse::NotFound().json(ErrorResponse::new(e.to_string(), "TASK_NOT_FOUND"))
        }
        OrchestratorError::Data(_) => HttpResponse::InternalServerError()
            .json(ErrorResponse::new(e.to_string(), "DATA_ERROR")),
    }
}

/// Create a task and run it on the requested organizations
pub async fn create_task(
    data: web::Data<AppState>,
    request: web::Json<TaskRequest>,
) -> impl Responder {
    let request = request.into_inner();
    info!(
        "API request: {} on organizations {:?}",
        request.input.method, request.organizations
    );

    match data.orchestrator.create_task(request).await {
        Ok(record) => HttpResponse::Ok().json(GenericResponse {
            success: true,
            message: format!("Task {} finished with status {}", record.id, record.status),
            data: serde_json::to_value(&record).ok(),
        }),
        Err(e) => {
            error!("Failed to create task: {}", e);
            error_response(&e)
        }
    }
}

/// All tasks, including subtasks
pub async fn list_tasks(data: web::Data<AppState>) -> impl Responder {
    let tasks = data.orchestrator.tasks();

    HttpResponse::Ok().json(GenericResponse {
        success: true,
        message: format!("{} tasks", tasks.len()),
        data: serde_json::to_value(&tasks).ok(),
    })
}

/// A single task record
pub async fn get_task(data: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    let id = path.into_inner();

    match data.orchestrator.task(id) {
        Some(record) => HttpResponse::Ok().json(GenericResponse {
            success: true,
            message: format!("Task {}", id),
            data: serde_json::to_value(&record).ok(),
        }),
        None => error_response(&OrchestratorError::TaskNotFound(id)),
    }
}

/// Run results of a task
pub async fn get_results(data: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    let task_id = path.into_inner();

    match data.orchestrator.results(task_id) {
        Ok(runs) => HttpResponse::Ok().json(GenericResponse {
            success: true,
            message: format!("{} runs", runs.len()),
            data: serde_json::to_value(&runs).ok(),
        }),
        Err(e) => error_response(&e),
    }
}
