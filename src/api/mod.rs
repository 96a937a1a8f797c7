mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::RunController;

pub use errors::ErrorResponse;

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub controller: RunController,
}

/// Build the HTTP router over a controller.
pub fn router(controller: RunController, max_body: usize) -> Router {
    let state = Arc::new(AppState { controller });

    Router::new()
        .route("/workflows", get(handlers::list_workflows))
        .route("/workflows/{id}/start", post(handlers::start_run))
        .route("/workflows/{id}/start-async", post(handlers::start_run_async))
        .route("/runs", get(handlers::list_runs))
        .route("/runs/{id}", get(handlers::get_run).delete(handlers::delete_run))
        .route("/runs/{id}/resume", post(handlers::resume_run))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the REST API server.
pub async fn serve(host: &str, port: u16, max_body: usize, controller: RunController) -> Result<()> {
    let app = router(controller, max_body);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Gateflow API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
