//! Client upload orchestrator: prepare, direct PUT, confirm with bounded
//! retries.
//!
//! The retry behavior lives in an explicit policy object instead of being
//! implied by caller-side polling. `UploadTransport` abstracts the three
//! calls a client makes, so the orchestrator can drive the in-process
//! services in tests and an HTTP client in a real deployment.

use crate::errors::AssetResult;
use crate::models::asset::Asset;
use crate::services::asset_service::{Reservation, ReserveRequest};
use std::time::Duration;
use uuid::Uuid;

/// Bounded exponential backoff for confirm retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }
}

/// The three calls a client makes, in order.
pub trait UploadTransport {
    fn prepare(
        &self,
        owner_scope: Uuid,
        req: ReserveRequest,
    ) -> impl Future<Output = AssetResult<Reservation>> + Send;

    fn put_object(
        &self,
        reservation: &Reservation,
        payload: Vec<u8>,
    ) -> impl Future<Output = AssetResult<()>> + Send;

    fn confirm(
        &self,
        asset_id: Uuid,
        owner_scope: Uuid,
    ) -> impl Future<Output = AssetResult<Asset>> + Send;
}

/// Drive one upload end to end: reserve, PUT, then confirm with retries.
///
/// Retryable confirm failures re-send the same asset id after backoff, up to
/// the policy's attempt bound; non-retryable failures surface immediately so
/// the caller can re-reserve from scratch.
pub async fn run_upload<T: UploadTransport>(
    transport: &T,
    policy: &RetryPolicy,
    owner_scope: Uuid,
    req: ReserveRequest,
    payload: Vec<u8>,
) -> AssetResult<Asset> {
    let reservation = transport.prepare(owner_scope, req).await?;
    transport.put_object(&reservation, payload).await?;

    let asset_id = reservation.asset.id;
    let mut attempt = 1;
    loop {
        match transport.confirm(asset_id, owner_scope).await {
            Ok(asset) => return Ok(asset),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                tracing::debug!(
                    asset_id = %asset_id,
                    attempt,
                    "confirm failed with retryable error, backing off: {err}"
                );
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
