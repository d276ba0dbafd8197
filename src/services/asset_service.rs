//! Asset repository, reservation, and confirmation services.
//!
//! One row per asset; every state transition is an optimistic
//! compare-and-swap on the `version` column, so request handlers and the
//! reconciliation sweeper can contend for the same row without locks. The
//! loser of a race sees `Conflict` and retries.

use crate::errors::{AssetError, AssetResult};
use crate::models::asset::{Asset, AssetState};
use crate::services::object_store::{ObjectStore, StoredObject};
use crate::services::{capability, ingress};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::Stream;
use sqlx::SqlitePool;
use std::{io, sync::Arc};
use uuid::Uuid;

/// MIME types accepted at reservation time.
const ALLOWED_MIME_TYPES: [&str; 9] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/pdf",
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

const MAX_NAME_LEN: usize = 255;

const ASSET_COLUMNS: &str = "id, owner_scope, name, declared_mime_type, declared_size, \
     storage_key, state, reserved_at, expires_at, confirmed_size, confirmed_checksum, version";

/// Client-asserted metadata for a new reservation.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub name: String,
    pub declared_mime_type: String,
    pub declared_size: i64,
}

/// Outcome of a successful reservation: the pending row plus the capability
/// token authorizing one direct PUT to its storage key.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub asset: Asset,
    pub upload_token: String,
}

/// Reservation + confirmation services over the asset repository.
#[derive(Clone)]
pub struct AssetService {
    pub db: Arc<SqlitePool>,
    pub store: ObjectStore,
    pub max_upload_bytes: i64,
    pub reservation_ttl: Duration,
    capability_secret: String,
}

impl AssetService {
    pub fn new(
        db: Arc<SqlitePool>,
        store: ObjectStore,
        max_upload_bytes: i64,
        reservation_ttl: std::time::Duration,
        capability_secret: impl Into<String>,
    ) -> Self {
        Self {
            db,
            store,
            max_upload_bytes,
            reservation_ttl: Duration::from_std(reservation_ttl)
                .unwrap_or_else(|_| Duration::minutes(15)),
            capability_secret: capability_secret.into(),
        }
    }

    /// Apply the embedded schema, statement by statement.
    pub async fn apply_migrations(pool: &SqlitePool) -> AssetResult<()> {
        let sql = include_str!("../../migrations/0001_init.sql");
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(pool).await?;
        }
        Ok(())
    }

    /// Phase 1: validate, create the pending record, mint the capability.
    ///
    /// Validation happens before any storage or repository touch. The storage
    /// key is derived from the fresh asset id, never from client input, and
    /// the capability is minted only after the row is durably inserted.
    pub async fn reserve(&self, owner_scope: Uuid, req: ReserveRequest) -> AssetResult<Reservation> {
        self.validate_request(&req)?;

        let id = Uuid::new_v4();
        let storage_key = ObjectStore::storage_key_for(id);
        let now = Utc::now();
        let expires_at = now + self.reservation_ttl;

        let asset = sqlx::query_as::<_, Asset>(&format!(
            "INSERT INTO assets ({ASSET_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, 0) \
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_scope)
        .bind(&req.name)
        .bind(&req.declared_mime_type)
        .bind(req.declared_size)
        .bind(&storage_key)
        .bind(AssetState::Reserved)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&*self.db)
        .await?;

        let upload_token = capability::mint(&self.capability_secret, id, expires_at);
        tracing::info!(
            asset_id = %id,
            owner_scope = %owner_scope,
            declared_size = req.declared_size,
            "reserved asset"
        );
        Ok(Reservation {
            asset,
            upload_token,
        })
    }

    /// Phase 2: verify the uploaded object and commit the record. Idempotent.
    pub async fn confirm(&self, asset_id: Uuid, owner_scope: Uuid) -> AssetResult<Asset> {
        let asset = self.fetch_scoped(asset_id, owner_scope).await?;
        let now = Utc::now();

        match asset.state {
            AssetState::Committed => Ok(asset),
            AssetState::Purged => Err(AssetError::NotFound),
            AssetState::Failed => Err(AssetError::Mismatch {
                declared: asset.declared_size,
                actual: asset.confirmed_size.unwrap_or(0),
            }),
            AssetState::Reserved | AssetState::Uploading => {
                if asset.is_expired(now) {
                    return Err(AssetError::Expired);
                }
                let uploading = if asset.state == AssetState::Reserved {
                    self.cas_begin_upload(asset.id, asset.version).await?
                } else {
                    asset
                };
                self.settle_uploading(uploading).await
            }
        }
    }

    /// Fetch an asset scoped to its owner. A foreign-scoped id is
    /// indistinguishable from an absent one.
    pub async fn get(&self, asset_id: Uuid, owner_scope: Uuid) -> AssetResult<Asset> {
        self.fetch_scoped(asset_id, owner_scope).await
    }

    /// Server-side ingestion path for the capability-authorized direct PUT.
    ///
    /// The body flows through the ingress guard into the same storage write
    /// path the rest of the system verifies against; an oversized payload is
    /// aborted mid-stream.
    pub async fn ingest<S>(
        &self,
        asset_id: Uuid,
        token: &str,
        stream: S,
    ) -> AssetResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let now = Utc::now();
        capability::verify(&self.capability_secret, asset_id, token, now)?;

        let asset = self.fetch_by_id(asset_id).await?;
        match asset.state {
            AssetState::Reserved | AssetState::Uploading => {}
            AssetState::Committed => {
                return Err(AssetError::Validation {
                    reason: "asset is already committed".into(),
                });
            }
            AssetState::Failed | AssetState::Purged => return Err(AssetError::NotFound),
        }
        if asset.is_expired(now) {
            return Err(AssetError::Expired);
        }

        let guarded = ingress::enforce_ceiling(stream, self.max_upload_bytes);
        self.store
            .put_stream(&asset.storage_key, guarded)
            .await
            .map_err(|err| ingress::oversize_to_asset_error(err, self.max_upload_bytes))
    }

    /// Verify the object behind an `Uploading` row and settle the outcome.
    ///
    /// Also used by the sweeper's salvage pass. A missing object leaves the
    /// row in `Uploading` (still TTL-bounded) so a confirm retry can succeed
    /// once the bytes arrive; a size mismatch is terminal.
    pub(crate) async fn settle_uploading(&self, asset: Asset) -> AssetResult<Asset> {
        debug_assert_eq!(asset.state, AssetState::Uploading);
        match self.store.stat(&asset.storage_key).await? {
            None => Err(AssetError::ObjectMissing),
            Some(obj) if obj.size == asset.declared_size => {
                let committed = self.cas_commit(asset.id, asset.version, &obj).await?;
                tracing::info!(
                    asset_id = %committed.id,
                    confirmed_size = obj.size,
                    "committed asset"
                );
                Ok(committed)
            }
            Some(obj) => {
                self.cas_fail(asset.id, asset.version, &obj).await?;
                tracing::warn!(
                    asset_id = %asset.id,
                    declared = asset.declared_size,
                    actual = obj.size,
                    "asset failed verification"
                );
                Err(AssetError::Mismatch {
                    declared: asset.declared_size,
                    actual: obj.size,
                })
            }
        }
    }

    /// CAS `Reserved -> Uploading`. Losing the swap means another
    /// confirmation is in flight.
    pub(crate) async fn cas_begin_upload(&self, id: Uuid, version: i64) -> AssetResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            "UPDATE assets SET state = ?, version = version + 1 \
             WHERE id = ? AND state = ? AND version = ? \
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(AssetState::Uploading)
        .bind(id)
        .bind(AssetState::Reserved)
        .bind(version)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AssetError::Conflict)
    }

    /// CAS `Uploading -> Committed`, recording the server-side measurement
    /// and clearing the TTL in the same statement.
    async fn cas_commit(&self, id: Uuid, version: i64, obj: &StoredObject) -> AssetResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            "UPDATE assets SET state = ?, confirmed_size = ?, confirmed_checksum = ?, \
             expires_at = NULL, version = version + 1 \
             WHERE id = ? AND state = ? AND version = ? \
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(AssetState::Committed)
        .bind(obj.size)
        .bind(&obj.checksum)
        .bind(id)
        .bind(AssetState::Uploading)
        .bind(version)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AssetError::Conflict)
    }

    /// CAS `Uploading -> Failed`, recording what was actually measured so a
    /// later confirm can report the mismatch without re-reading the store.
    async fn cas_fail(&self, id: Uuid, version: i64, obj: &StoredObject) -> AssetResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            "UPDATE assets SET state = ?, confirmed_size = ?, confirmed_checksum = ?, \
             version = version + 1 \
             WHERE id = ? AND state = ? AND version = ? \
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(AssetState::Failed)
        .bind(obj.size)
        .bind(&obj.checksum)
        .bind(id)
        .bind(AssetState::Uploading)
        .bind(version)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AssetError::Conflict)
    }

    /// CAS any non-terminal-or-failed state to `Purged`.
    pub(crate) async fn cas_purge(
        &self,
        id: Uuid,
        from: AssetState,
        version: i64,
    ) -> AssetResult<Asset> {
        debug_assert!(from.can_transition_to(AssetState::Purged));
        sqlx::query_as::<_, Asset>(&format!(
            "UPDATE assets SET state = ?, expires_at = NULL, version = version + 1 \
             WHERE id = ? AND state = ? AND version = ? \
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(AssetState::Purged)
        .bind(id)
        .bind(from)
        .bind(version)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AssetError::Conflict)
    }

    /// Non-terminal assets whose TTL elapsed before `now`, oldest first.
    pub(crate) async fn fetch_expired(&self, now: DateTime<Utc>, limit: u32) -> AssetResult<Vec<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets \
             WHERE state IN (?, ?) AND expires_at IS NOT NULL AND expires_at < ? \
             ORDER BY expires_at ASC LIMIT ?"
        ))
        .bind(AssetState::Reserved)
        .bind(AssetState::Uploading)
        .bind(now)
        .bind(limit)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Failed assets whose retention window elapsed before `cutoff`.
    pub(crate) async fn fetch_failed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> AssetResult<Vec<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets \
             WHERE state = ? AND reserved_at < ? \
             ORDER BY reserved_at ASC LIMIT ?"
        ))
        .bind(AssetState::Failed)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Whether any non-purged record claims `storage_key`. Used by the orphan
    /// scan; a live row of any active state protects the object.
    pub(crate) async fn storage_key_is_live(&self, storage_key: &str) -> AssetResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assets WHERE storage_key = ? AND state != ?",
        )
        .bind(storage_key)
        .bind(AssetState::Purged)
        .fetch_one(&*self.db)
        .await?;
        Ok(count > 0)
    }

    pub(crate) async fn fetch_by_id(&self, id: Uuid) -> AssetResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AssetError::NotFound)
    }

    async fn fetch_scoped(&self, id: Uuid, owner_scope: Uuid) -> AssetResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ? AND owner_scope = ?"
        ))
        .bind(id)
        .bind(owner_scope)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AssetError::NotFound)
    }

    /// Cheap rejection path: no storage or repository interaction.
    fn validate_request(&self, req: &ReserveRequest) -> AssetResult<()> {
        if req.name.trim().is_empty() || req.name.len() > MAX_NAME_LEN {
            return Err(AssetError::Validation {
                reason: format!("name must be 1..={} characters", MAX_NAME_LEN),
            });
        }
        if req.declared_size <= 0 {
            return Err(AssetError::Validation {
                reason: "declared size must be positive".into(),
            });
        }
        if req.declared_size > self.max_upload_bytes {
            return Err(AssetError::Validation {
                reason: format!(
                    "declared size {} exceeds the {}-byte ceiling",
                    req.declared_size, self.max_upload_bytes
                ),
            });
        }
        if !ALLOWED_MIME_TYPES.contains(&req.declared_mime_type.as_str()) {
            return Err(AssetError::Validation {
                reason: format!("mime type `{}` is not allowed", req.declared_mime_type),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    pub const MAX_BYTES: i64 = 4 * 1024 * 1024;
    pub const SECRET: &str = "test-capability-secret";

    pub struct Harness {
        pub service: AssetService,
        // Held so the store directory outlives the test.
        pub _dir: TempDir,
    }

    pub async fn harness() -> Harness {
        harness_with_ttl(std::time::Duration::from_secs(900)).await
    }

    pub async fn harness_with_ttl(ttl: std::time::Duration) -> Harness {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        AssetService::apply_migrations(&pool)
            .await
            .expect("apply migrations");

        let dir = tempfile::tempdir().expect("create temp store dir");
        let service = AssetService::new(
            Arc::new(pool),
            ObjectStore::new(dir.path()),
            MAX_BYTES,
            ttl,
            SECRET,
        );
        Harness {
            service,
            _dir: dir,
        }
    }

    pub fn png_request(declared_size: i64) -> ReserveRequest {
        ReserveRequest {
            name: "logo.png".into(),
            declared_mime_type: "image/png".into(),
            declared_size,
        }
    }

    pub fn bytes_stream(payload: Vec<u8>) -> impl Stream<Item = io::Result<Bytes>> + Send {
        futures::stream::once(async move { Ok(Bytes::from(payload)) })
    }

    /// Backdate a reservation's deadline so expiry paths run deterministically.
    pub async fn force_expire(service: &AssetService, id: Uuid) {
        sqlx::query("UPDATE assets SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(1))
            .bind(id)
            .execute(&*service.db)
            .await
            .expect("backdate expiry");
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn reserve_creates_pending_row_with_ttl() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(1024)).await.unwrap();

        assert_eq!(res.asset.state, AssetState::Reserved);
        assert_eq!(res.asset.owner_scope, owner);
        assert!(res.asset.expires_at.is_some());
        assert_eq!(
            res.asset.storage_key,
            ObjectStore::storage_key_for(res.asset.id)
        );
        assert!(res.asset.confirmed_size.is_none());
        assert_eq!(res.asset.version, 0);
        assert!(!res.upload_token.is_empty());
    }

    #[tokio::test]
    async fn reserve_rejects_oversize_and_bad_mime_before_any_side_effect() {
        let h = harness().await;
        let owner = Uuid::new_v4();

        let too_big = h
            .service
            .reserve(owner, png_request(MAX_BYTES + 1))
            .await
            .unwrap_err();
        assert!(matches!(too_big, AssetError::Validation { .. }));

        let bad_mime = h
            .service
            .reserve(
                owner,
                ReserveRequest {
                    name: "payload.exe".into(),
                    declared_mime_type: "application/x-msdownload".into(),
                    declared_size: 10,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(bad_mime, AssetError::Validation { .. }));

        // Cheap rejection: nothing was written anywhere.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets")
            .fetch_one(&*h.service.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(h.service.store.list_keys(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_lifecycle_reserve_upload_confirm() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let payload = vec![7u8; 2048];

        let res = h.service.reserve(owner, png_request(2048)).await.unwrap();
        h.service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(payload.clone()))
            .await
            .unwrap();

        let committed = h.service.confirm(res.asset.id, owner).await.unwrap();
        assert_eq!(committed.state, AssetState::Committed);
        assert_eq!(committed.confirmed_size, Some(2048));
        assert_eq!(
            committed.confirmed_checksum.as_deref(),
            Some(format!("{:x}", md5::compute(&payload)).as_str())
        );
        assert!(committed.expires_at.is_none());
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();
        h.service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(vec![1u8; 16]))
            .await
            .unwrap();

        let first = h.service.confirm(res.asset.id, owner).await.unwrap();
        let second = h.service.confirm(res.asset.id, owner).await.unwrap();
        assert_eq!(first.state, AssetState::Committed);
        assert_eq!(second.confirmed_size, first.confirmed_size);
        assert_eq!(second.confirmed_checksum, first.confirmed_checksum);
        // No additional mutation on the second call.
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn confirm_before_upload_reports_object_missing_and_stays_retryable() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();

        let err = h.service.confirm(res.asset.id, owner).await.unwrap_err();
        assert!(matches!(err, AssetError::ObjectMissing));
        assert!(err.is_retryable());

        // The object arrives late; a retry with the same id succeeds.
        h.service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(vec![9u8; 16]))
            .await
            .unwrap();
        let committed = h.service.confirm(res.asset.id, owner).await.unwrap();
        assert_eq!(committed.state, AssetState::Committed);
    }

    #[tokio::test]
    async fn size_mismatch_fails_terminally() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();
        h.service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(vec![0u8; 24]))
            .await
            .unwrap();

        let err = h.service.confirm(res.asset.id, owner).await.unwrap_err();
        match err {
            AssetError::Mismatch { declared, actual } => {
                assert_eq!(declared, 16);
                assert_eq!(actual, 24);
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }

        // Retrying reports the same non-retryable verdict without re-verifying.
        let again = h.service.confirm(res.asset.id, owner).await.unwrap_err();
        assert!(matches!(again, AssetError::Mismatch { .. }));
        assert!(!again.is_retryable());

        let row = h.service.fetch_by_id(res.asset.id).await.unwrap();
        assert_eq!(row.state, AssetState::Failed);
    }

    #[tokio::test]
    async fn foreign_scope_looks_like_not_found() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();

        let err = h
            .service
            .confirm(res.asset.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound));
        let err = h.service.get(res.asset.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound));
    }

    #[tokio::test]
    async fn expired_reservation_cannot_be_confirmed() {
        let h = harness_with_ttl(std::time::Duration::ZERO).await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let err = h.service.confirm(res.asset.id, owner).await.unwrap_err();
        assert!(matches!(err, AssetError::Expired));
    }

    #[tokio::test]
    async fn losing_the_cas_race_yields_conflict() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();
        h.service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(vec![2u8; 16]))
            .await
            .unwrap();

        // Two callers loaded version 0; only one swap can win.
        let won = h.service.cas_begin_upload(res.asset.id, 0).await.unwrap();
        assert_eq!(won.state, AssetState::Uploading);
        let lost = h.service.cas_begin_upload(res.asset.id, 0).await.unwrap_err();
        assert!(matches!(lost, AssetError::Conflict));
        assert!(lost.is_retryable());
    }

    #[tokio::test]
    async fn concurrent_confirms_commit_exactly_once() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(64)).await.unwrap();
        h.service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(vec![3u8; 64]))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            h.service.confirm(res.asset.id, owner),
            h.service.confirm(res.asset.id, owner),
        );
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert!(successes >= 1, "at least one confirm must win: {a:?} {b:?}");
        for result in [&a, &b] {
            if let Err(err) = result {
                assert!(matches!(err, AssetError::Conflict), "unexpected: {err:?}");
            }
        }

        // Exactly two transitions happened: Reserved -> Uploading -> Committed.
        let row = h.service.fetch_by_id(res.asset.id).await.unwrap();
        assert_eq!(row.state, AssetState::Committed);
        assert_eq!(row.version, 2);
    }

    #[tokio::test]
    async fn ingest_rejects_oversize_payload_before_buffering() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h
            .service
            .reserve(owner, png_request(MAX_BYTES))
            .await
            .unwrap();

        let oversized = vec![0u8; MAX_BYTES as usize + 1];
        let err = h
            .service
            .ingest(res.asset.id, &res.upload_token, bytes_stream(oversized))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::PayloadTooLarge { .. }));

        // The aborted write left nothing at the storage key.
        assert!(
            h.service
                .store
                .stat(&res.asset.storage_key)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn two_megabyte_scenario_commits_with_exact_size() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let declared = 2 * 1024 * 1024;

        let res = h.service.reserve(owner, png_request(declared)).await.unwrap();
        h.service
            .ingest(
                res.asset.id,
                &res.upload_token,
                bytes_stream(vec![0xABu8; declared as usize]),
            )
            .await
            .unwrap();
        let committed = h.service.confirm(res.asset.id, owner).await.unwrap();
        assert_eq!(committed.confirmed_size, Some(2_097_152));

        // Same declaration, three megabytes of bytes: terminal mismatch.
        let res = h.service.reserve(owner, png_request(declared)).await.unwrap();
        h.service
            .ingest(
                res.asset.id,
                &res.upload_token,
                bytes_stream(vec![0xCDu8; 3 * 1024 * 1024]),
            )
            .await
            .unwrap();
        let err = h.service.confirm(res.asset.id, owner).await.unwrap_err();
        assert!(matches!(
            err,
            AssetError::Mismatch {
                declared: 2_097_152,
                actual: 3_145_728
            }
        ));
    }

    #[tokio::test]
    async fn ingest_requires_a_valid_capability() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let res = h.service.reserve(owner, png_request(16)).await.unwrap();

        let err = h
            .service
            .ingest(res.asset.id, "forged-token", bytes_stream(vec![1u8; 16]))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidCapability));
    }
}
