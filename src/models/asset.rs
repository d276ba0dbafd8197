//! The asset record and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of an asset record.
///
/// Transitions are one-directional: `Reserved -> Uploading`, then exactly one
/// of `Committed`, `Failed`, or (via the sweeper) `Purged`. The terminal
/// states have no outgoing transitions. Persisted as TEXT in SQLite.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetState {
    Reserved,
    Uploading,
    Committed,
    Failed,
    Purged,
}

impl AssetState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: AssetState) -> bool {
        use AssetState::*;
        matches!(
            (self, next),
            (Reserved, Uploading)
                | (Uploading, Committed)
                | (Uploading, Failed)
                | (Uploading, Purged)
                | (Reserved, Purged)
                | (Failed, Purged)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AssetState::Committed | AssetState::Failed | AssetState::Purged
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetState::Reserved => "reserved",
            AssetState::Uploading => "uploading",
            AssetState::Committed => "committed",
            AssetState::Failed => "failed",
            AssetState::Purged => "purged",
        }
    }
}

/// A single asset record: the durable side of one upload.
///
/// `declared_*` fields are client-asserted and untrusted until confirmation;
/// `confirmed_*` fields come only from a server-side read of the actual
/// object, recorded when verification settles (commit or failure).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Asset {
    /// Opaque unique identifier, generated at reservation time.
    pub id: Uuid,

    /// Workspace that owns this asset; every operation is scoped by it.
    pub owner_scope: Uuid,

    /// Client-supplied display name.
    pub name: String,

    /// Client-declared MIME type, validated against the allow-list.
    pub declared_mime_type: String,

    /// Client-declared size in bytes.
    pub declared_size: i64,

    /// Object-store path reserved for this asset. Derived from `id`, assigned
    /// exactly once, never reused even after a purge.
    pub storage_key: String,

    /// Current lifecycle state.
    pub state: AssetState,

    /// When the reservation was created.
    pub reserved_at: DateTime<Utc>,

    /// Absolute TTL for non-committed states; NULL once committed.
    pub expires_at: Option<DateTime<Utc>>,

    /// Actual object size, measured server-side when verification settled.
    pub confirmed_size: Option<i64>,

    /// Actual object checksum (md5 hex), measured server-side when
    /// verification settled.
    pub confirmed_checksum: Option<String>,

    /// Monotonic counter guarding optimistic state transitions.
    pub version: i64,
}

impl Asset {
    /// Whether the reservation TTL has elapsed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}
