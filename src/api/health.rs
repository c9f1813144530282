use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::db::AttendanceStore;
use crate::services::recognition::RecognitionService;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub database: ServiceHealth,
    pub recognition_service: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_result<E: std::fmt::Display>(start: Instant, result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                status: "healthy".to_string(),
                response_time_ms: start.elapsed().as_millis(),
                error: None,
            },
            Err(e) => Self {
                status: "unhealthy".to_string(),
                response_time_ms: start.elapsed().as_millis(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Health check endpoint
/// Returns 200 while the database is reachable, 503 otherwise.
/// The recognition service is reported but is best-effort.
pub async fn health_check(
    State(store): State<Arc<dyn AttendanceStore>>,
    State(recognition): State<Arc<dyn RecognitionService>>,
) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let db_start = Instant::now();
    let db_health = ServiceHealth::from_result(db_start, store.ping().await);

    let recognition_start = Instant::now();
    let recognition_health =
        ServiceHealth::from_result(recognition_start, recognition.health().await);

    let healthy = db_health.status == "healthy";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus {
            database: db_health,
            recognition_service: recognition_health,
        },
    };

    tracing::info!(
        status = %response.status,
        recognition = %response.dependencies.recognition_service.status,
        duration_ms = start.elapsed().as_millis() as u64,
        "Health check completed"
    );

    (status_code, Json(response))
}
