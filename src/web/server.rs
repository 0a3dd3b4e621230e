use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use log::info;

use crate::core::orchestrator::Orchestrator;
use crate::web::handlers;

/// Shared application state for web handlers
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// API routes, shared by the server and handler tests
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // System APIs
            .route("/health", web::get().to(handlers::system::health))
            .route("/metrics", web::get().to(handlers::system::metrics))
            // Federation APIs
            .route("/organization", web::get().to(handlers::organization::list_organizations))
            .route("/collaboration", web::get().to(handlers::organization::get_collaboration))
            // Task APIs
            .route("/task", web::get().to(handlers::task::list_tasks))
            .route("/task", web::post().to(handlers::task::create_task))
            .route("/task/{id}", web::get().to(handlers::task::get_task))
            .route("/result/{task_id}", web::get().to(handlers::task::get_results)),
    )
    .default_service(web::route().to(handlers::system::not_found));
}

/// Start the HTTP API of the mock federation
pub async fn start_web_server(orchestrator: Arc<Orchestrator>, bind: String) -> std::io::Result<()> {
    info!("Starting web server on http://{}", bind);

    // Create shared application state
    let app_state = web::Data::new(AppState { orchestrator });

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .bind(bind)?
    .run()
    .await
}
