// API module - HTTP endpoints

use axum::{
    extract::{rejection::PathRejection, Path},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

pub mod camera;
pub mod health;
pub mod sessions;
pub mod state;
pub mod students;

use crate::error::{AppError, Result};
use crate::models::fits;
use state::AppState;

/// Session id path parameter, with rejections reported as JSON errors
pub(crate) type SessionPath = std::result::Result<Path<Uuid>, PathRejection>;

/// Trims a request field, treating blank strings as missing
pub(crate) fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Rejects a field wider than the column that stores it
pub(crate) fn check_length(field: &str, value: &str, max: usize) -> Result<()> {
    if fits(value, max) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )))
    }
}

pub fn router() -> Router<AppState> {
    let attendance = Router::new()
        .merge(sessions::router())
        .merge(students::router())
        .merge(camera::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/attendance", attendance)
}

/// Binds the HTTP listener; `host` may be a name or an IP address
pub async fn bind(host: &str, port: u16) -> std::io::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((host, port)).await
}

/// Full application with middleware and state applied
pub fn app(state: AppState) -> Router {
    router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
