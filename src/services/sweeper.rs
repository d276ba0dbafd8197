//! Reconciliation sweeper.
//!
//! Periodic corrective pass over stale reservations, retained failures, and
//! orphan objects. Every mutation goes through the same version CAS the
//! request handlers use, so a sweep racing an in-flight confirmation simply
//! loses and skips that asset until the next cycle. An object is never
//! deleted before its record reaches a terminal state.

use crate::errors::{AssetError, AssetResult};
use crate::models::asset::{Asset, AssetState};
use crate::services::asset_service::AssetService;
use chrono::{Duration, Utc};
use tracing::{info, warn};

/// Per-cycle counters, logged after every sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    /// Expired reservations whose object turned out to be present and valid.
    pub salvaged: u64,
    /// Expired or retained-failed assets purged, with their objects deleted.
    pub purged_expired: u64,
    /// Store objects deleted because no live record claims their key.
    pub purged_orphans: u64,
    /// Assets skipped this cycle after losing a CAS race.
    pub skipped: u64,
    /// Store or repository faults encountered; retried next cycle.
    pub errors: u64,
}

/// Background reconciliation task over the asset repository and store.
#[derive(Clone)]
pub struct Sweeper {
    service: AssetService,
    failed_retention: Duration,
    batch: u32,
    orphan_scan_batch: usize,
}

impl Sweeper {
    pub fn new(
        service: AssetService,
        failed_retention: std::time::Duration,
        orphan_scan_batch: usize,
    ) -> Self {
        Self {
            service,
            failed_retention: Duration::from_std(failed_retention)
                .unwrap_or_else(|_| Duration::hours(1)),
            batch: 200,
            orphan_scan_batch,
        }
    }

    /// Run forever on a fixed interval. Spawned once at startup.
    pub async fn run(self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(stats) => info!(
                    salvaged = stats.salvaged,
                    purged_expired = stats.purged_expired,
                    purged_orphans = stats.purged_orphans,
                    skipped = stats.skipped,
                    errors = stats.errors,
                    "reconciliation sweep complete"
                ),
                Err(err) => warn!("reconciliation sweep aborted: {err}"),
            }
        }
    }

    /// One full corrective pass. Safe to run concurrently with request
    /// handlers and with a redundant sweeper instance.
    pub async fn sweep_once(&self) -> AssetResult<SweepStats> {
        let mut stats = SweepStats::default();
        let now = Utc::now();

        for asset in self.service.fetch_expired(now, self.batch).await? {
            self.resolve_stale(asset, &mut stats).await;
        }

        let cutoff = now - self.failed_retention;
        for asset in self.service.fetch_failed_before(cutoff, self.batch).await? {
            self.purge(asset, &mut stats).await;
        }

        self.reclaim_orphans(&mut stats).await?;
        Ok(stats)
    }

    /// Resolve one expired `Reserved`/`Uploading` asset: salvage it if the
    /// object arrived and matches, purge it otherwise.
    async fn resolve_stale(&self, asset: Asset, stats: &mut SweepStats) {
        let asset = if asset.state == AssetState::Reserved {
            match self.service.cas_begin_upload(asset.id, asset.version).await {
                Ok(uploading) => uploading,
                Err(AssetError::Conflict) => {
                    stats.skipped += 1;
                    return;
                }
                Err(err) => {
                    warn!(asset_id = %asset.id, "stale sweep fault: {err}");
                    stats.errors += 1;
                    return;
                }
            }
        } else {
            asset
        };

        match self.service.settle_uploading(asset.clone()).await {
            Ok(committed) => {
                info!(asset_id = %committed.id, outcome = "salvaged", "sweep resolved asset");
                stats.salvaged += 1;
            }
            Err(AssetError::ObjectMissing) => {
                // Never arrived; record first, then nothing to delete.
                self.purge(asset, stats).await;
            }
            Err(AssetError::Mismatch { .. }) => {
                // Now Failed; picked up by the retention pass later.
                stats.skipped += 1;
            }
            Err(AssetError::Conflict) => stats.skipped += 1,
            Err(err) => {
                warn!(asset_id = %asset.id, "stale sweep fault: {err}");
                stats.errors += 1;
            }
        }
    }

    /// Drive one asset to `Purged`, then best-effort delete its object.
    /// Record resolution always precedes object deletion.
    async fn purge(&self, asset: Asset, stats: &mut SweepStats) {
        match self
            .service
            .cas_purge(asset.id, asset.state, asset.version)
            .await
        {
            Ok(purged) => {
                if let Err(err) = self.service.store.delete(&purged.storage_key).await {
                    warn!(
                        asset_id = %purged.id,
                        storage_key = %purged.storage_key,
                        "object delete after purge failed: {err}"
                    );
                }
                info!(asset_id = %purged.id, outcome = "purged-expired", "sweep resolved asset");
                stats.purged_expired += 1;
            }
            Err(AssetError::Conflict) => stats.skipped += 1,
            Err(err) => {
                warn!(asset_id = %asset.id, "purge fault: {err}");
                stats.errors += 1;
            }
        }
    }

    /// Delete objects whose key no record claims: the backstop against
    /// uploads that completed at the store while their reservation was lost.
    async fn reclaim_orphans(&self, stats: &mut SweepStats) -> AssetResult<()> {
        for key in self.service.store.list_keys(self.orphan_scan_batch).await? {
            match self.service.storage_key_is_live(&key).await {
                Ok(true) => {}
                Ok(false) => match self.service.store.delete(&key).await {
                    Ok(true) => {
                        info!(storage_key = %key, outcome = "purged-orphan", "sweep resolved object");
                        stats.purged_orphans += 1;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(storage_key = %key, "orphan delete failed: {err}");
                        stats.errors += 1;
                    }
                },
                Err(err) => {
                    warn!(storage_key = %key, "orphan lookup failed: {err}");
                    stats.errors += 1;
                }
            }
        }
        Ok(())
    }
}
