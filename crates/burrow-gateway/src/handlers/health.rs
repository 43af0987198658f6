use crate::model::HealthResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::error;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Reports whether the configured storage is reachable.
pub async fn ping_handler(State(state): State<AppState>) -> StatusCode {
    match state.storage().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "storage ping failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
