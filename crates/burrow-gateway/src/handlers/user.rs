use crate::error::{AppError, Result};
use crate::middleware::Owner;
use crate::model::HistoryItem;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use burrow_core::LinkId;
use tracing::info;

/// Lists the links created by the calling owner, 204 when there are none.
pub async fn user_urls_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Response> {
    let history = state.storage().history(&owner).await?;
    if history.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let items: Vec<HistoryItem> = history
        .into_iter()
        .map(|record| HistoryItem {
            short_url: state.short_url(record.id),
            original_url: record.original_url,
        })
        .collect();
    Ok(Json(items).into_response())
}

/// Accepts a list of ids for deletion. Ids the caller does not own are ignored.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: std::result::Result<Json<Vec<String>>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(raw_ids) = payload?;
    let ids = raw_ids
        .iter()
        .map(|raw| raw.parse::<LinkId>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state.storage().delete(&owner, &ids).await?;
    info!(owner = %owner, count = ids.len(), "accepted delete request");
    Ok(StatusCode::ACCEPTED)
}
