//! Route table for the upload subsystem.
//!
//! ## Structure
//! - **Reservation endpoints**
//!   - `POST /reservations` — phase 1: pending record + upload capability
//!   - `POST /reservations/{assetId}/confirm` — phase 2: verify + commit
//!
//! - **Asset read**
//!   - `GET  /assets/{assetId}` — committed metadata (state-only otherwise)
//!
//! - **Store-facing upload**
//!   - `PUT  /uploads/{assetId}?token=...` — capability-authorized direct PUT
//!
//! The router carries shared state (`AssetService`) to all handlers.

use crate::{
    handlers::{
        asset_handlers::{confirm, get_asset, reserve},
        health_handlers::{healthz, readyz},
        upload_handlers::put_upload,
    },
    services::asset_service::AssetService,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for all upload-subsystem routes.
pub fn routes() -> Router<AssetService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // reservation lifecycle
        .route("/reservations", post(reserve))
        .route("/reservations/{asset_id}/confirm", post(confirm))
        // committed asset reads
        .route("/assets/{asset_id}", get(get_asset))
        // store-facing direct upload
        .route("/uploads/{asset_id}", put(put_upload))
}
