use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use burrow_core::Statistic;
use std::net::IpAddr;
use tracing::warn;

pub const REAL_IP_HEADER: &str = "x-real-ip";

/// `GET /api/internal/stats`, restricted to clients inside the trusted subnet.
pub async fn stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Statistic>> {
    let subnet = state.trusted_subnet().ok_or(AppError::Forbidden)?;

    let client_ip = headers
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());

    match client_ip {
        Some(ip) if subnet.contains(&ip) => Ok(Json(state.storage().statistic().await?)),
        _ => {
            warn!(client_ip = ?client_ip, subnet = %subnet, "rejected stats request");
            Err(AppError::Forbidden)
        }
    }
}
