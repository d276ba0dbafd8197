//! Store-facing direct upload endpoint.
//!
//! `PUT /uploads/{assetId}?token=...` is the target of the capability minted
//! at reservation time. The token alone authorizes the write; the body is
//! streamed through the ingress guard into the reserved storage key without
//! ever being buffered whole.

use crate::{errors::AppError, services::asset_service::AssetService};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub asset_id: Uuid,
    pub received_size: i64,
}

/// PUT `/uploads/{assetId}` — capability-authorized direct write.
pub async fn put_upload(
    State(service): State<AssetService>,
    Path(asset_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let stored = service.ingest(asset_id, &query.token, stream).await?;
    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            asset_id,
            received_size: stored.size,
        }),
    ))
}
