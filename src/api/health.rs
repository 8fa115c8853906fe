use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, error};

use crate::api::AppState;
use crate::health::HealthStatus;

pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health.check_health().await;

    // 503 if any component is down
    if health_status.is_healthy() {
        debug!("Health check passed");
        Ok(Json(health_status))
    } else {
        error!("Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}

/// Readiness probe - the service can take traffic once its dependencies answer
pub async fn readiness(
    state: State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    health(state).await
}

/// Liveness probe - the process is up
pub async fn liveness() -> &'static str {
    "OK"
}
