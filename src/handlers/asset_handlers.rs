//! Reservation and confirmation endpoints.
//!
//! The workspace owning a request is taken from the `x-workspace-id` header;
//! authentication itself happens upstream. Every repository operation is
//! scoped by that id.

use crate::{
    errors::AppError,
    models::asset::{Asset, AssetState},
    services::asset_service::{AssetService, ReserveRequest},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const WORKSPACE_HEADER: &str = "x-workspace-id";

/// Body of `POST /reservations`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveBody {
    pub name: String,
    pub declared_mime_type: String,
    pub declared_size: i64,
}

/// Response of `POST /reservations`: the upload capability.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    pub asset_id: Uuid,
    pub storage_key: String,
    pub upload_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response of a successful confirm.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub asset_id: Uuid,
    pub state: AssetState,
    pub confirmed_size: i64,
    pub confirmed_checksum: Option<String>,
}

/// Full metadata, exposed only once an asset is committed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedAssetView {
    pub asset_id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub state: AssetState,
    pub storage_key: String,
    pub confirmed_size: i64,
    pub confirmed_checksum: Option<String>,
    pub reserved_at: DateTime<Utc>,
}

/// State-only view for assets that are not yet usable.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAssetView {
    pub asset_id: Uuid,
    pub state: AssetState,
}

/// POST `/reservations` — phase 1: create a pending asset and mint the
/// direct-PUT capability.
pub async fn reserve(
    State(service): State<AssetService>,
    headers: HeaderMap,
    Json(body): Json<ReserveBody>,
) -> Result<impl IntoResponse, AppError> {
    let owner = workspace_from(&headers)?;
    let reservation = service
        .reserve(
            owner,
            ReserveRequest {
                name: body.name,
                declared_mime_type: body.declared_mime_type,
                declared_size: body.declared_size,
            },
        )
        .await?;

    let response = ReserveResponse {
        asset_id: reservation.asset.id,
        storage_key: reservation.asset.storage_key.clone(),
        upload_url: format!(
            "/uploads/{}?token={}",
            reservation.asset.id, reservation.upload_token
        ),
        expires_at: reservation.asset.expires_at,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST `/reservations/{assetId}/confirm` — phase 2: verify and commit.
/// Safe to call repeatedly.
pub async fn confirm(
    State(service): State<AssetService>,
    Path(asset_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let owner = workspace_from(&headers)?;
    let asset = service.confirm(asset_id, owner).await?;

    Ok(Json(ConfirmResponse {
        asset_id: asset.id,
        state: asset.state,
        confirmed_size: asset.confirmed_size.unwrap_or(0),
        confirmed_checksum: asset.confirmed_checksum,
    }))
}

/// GET `/assets/{assetId}` — full metadata once committed; otherwise only
/// the state, so pollers can watch progress without treating the asset as
/// usable.
pub async fn get_asset(
    State(service): State<AssetService>,
    Path(asset_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let owner = workspace_from(&headers)?;
    let asset = service.get(asset_id, owner).await?;

    if asset.state == AssetState::Committed {
        Ok(Json(committed_view(asset)).into_response())
    } else {
        Ok(Json(PendingAssetView {
            asset_id: asset.id,
            state: asset.state,
        })
        .into_response())
    }
}

fn committed_view(asset: Asset) -> CommittedAssetView {
    CommittedAssetView {
        asset_id: asset.id,
        name: asset.name,
        mime_type: asset.declared_mime_type,
        state: asset.state,
        storage_key: asset.storage_key,
        confirmed_size: asset.confirmed_size.unwrap_or(0),
        confirmed_checksum: asset.confirmed_checksum,
        reserved_at: asset.reserved_at,
    }
}

pub(crate) fn workspace_from(headers: &HeaderMap) -> Result<Uuid, AppError> {
    headers
        .get(WORKSPACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            AppError::new(
                StatusCode::BAD_REQUEST,
                format!("missing or invalid {} header", WORKSPACE_HEADER),
            )
        })
}
