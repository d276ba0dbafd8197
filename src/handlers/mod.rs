//! HTTP handlers for the reservation, confirmation, upload, and health
//! endpoints.

pub mod asset_handlers;
pub mod health_handlers;
pub mod upload_handlers;
