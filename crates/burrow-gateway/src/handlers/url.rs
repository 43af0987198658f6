use crate::error::{AppError, Result};
use crate::middleware::Owner;
use crate::model::{BatchRequestItem, BatchResponseItem, ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use burrow_core::{Created, LinkId, StorageError};
use tracing::info;

fn create_status(created: &Created) -> StatusCode {
    if created.conflict {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

async fn shorten_one(state: &AppState, owner: &str, url: String) -> Result<(StatusCode, String)> {
    if url.is_empty() {
        return Err(AppError::BadRequest("empty url".to_string()));
    }

    let created = state.storage().create_short(owner, &[url]).await?;
    let id = created
        .ids
        .first()
        .copied()
        .ok_or_else(|| StorageError::InvalidData("create returned no id".to_string()))?;

    info!(owner = %owner, id = %id, conflict = created.conflict, "shortened url");
    Ok((create_status(&created), state.short_url(id)))
}

/// `POST /` with the URL as a plain-text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: String,
) -> Result<Response> {
    let url = body.trim().to_string();
    let (status, short_url) = shorten_one(&state, &owner, url).await?;
    Ok((status, short_url).into_response())
}

pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: std::result::Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    let (status, result) = shorten_one(&state, &owner, request.url).await?;
    Ok((status, Json(ShortenResponse { result })).into_response())
}

pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: std::result::Result<Json<Vec<BatchRequestItem>>, JsonRejection>,
) -> Result<Response> {
    let Json(items) = payload?;
    if items.is_empty() {
        return Err(AppError::BadRequest("empty batch".to_string()));
    }

    let urls: Vec<String> = items.iter().map(|item| item.original_url.clone()).collect();
    let created = state.storage().create_short(&owner, &urls).await?;
    if created.ids.len() != items.len() {
        return Err(StorageError::InvalidData(format!(
            "created {} ids for {} urls",
            created.ids.len(),
            items.len()
        ))
        .into());
    }

    info!(owner = %owner, count = items.len(), conflict = created.conflict, "shortened batch");

    let response: Vec<BatchResponseItem> = items
        .into_iter()
        .zip(&created.ids)
        .map(|(item, id)| BatchResponseItem {
            correlation_id: item.correlation_id,
            short_url: state.short_url(*id),
        })
        .collect();

    Ok((create_status(&created), Json(response)).into_response())
}

/// `GET /{id}` redirects to the original URL.
pub async fn redirect_handler(
    Path(raw_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Redirect> {
    let id: LinkId = raw_id
        .parse()
        .map_err(|_| StorageError::NotFound(format!("link {raw_id} not found")))?;

    let url = state.storage().get_long(id).await?;
    Ok(Redirect::temporary(&url))
}
