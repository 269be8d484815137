//! Database models mapping to the replica metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Users
// =============================================================================

/// User record. One row per wallet; `clock` is the max clock of the user's
/// clock records and advances by exactly one per committed mutation.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_uuid: Uuid,
    pub wallet_public_key: String,
    pub clock: i64,
    pub latest_block_number: i64,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Clock log
// =============================================================================

/// One clock-log row. For a given user the `clock` values form the dense
/// sequence `0..=user.clock`.
#[derive(Debug, Clone, FromRow)]
pub struct ClockRecordRow {
    pub user_uuid: Uuid,
    pub clock: i64,
    pub source_table: String,
    pub source_row_id: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Files
// =============================================================================

/// Content file descriptor. When `skipped` is false the bytes at
/// `storage_path` exist and hash to `multihash`; when true the row is a
/// placeholder awaiting the retry loop.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_uuid: Uuid,
    pub user_uuid: Uuid,
    pub clock: i64,
    pub multihash: String,
    pub storage_path: String,
    pub file_type: String,
    pub track_blockchain_id: Option<i64>,
    pub dir_multihash: Option<String>,
    pub file_name: Option<String>,
    pub size_bytes: Option<i64>,
    pub skipped: bool,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tracks
// =============================================================================

/// Track record keyed by the chain-assigned track id within a user.
#[derive(Debug, Clone, FromRow)]
pub struct TrackRow {
    pub track_blockchain_id: i64,
    pub user_uuid: Uuid,
    pub clock: i64,
    pub metadata_multihash: String,
    pub cover_art_multihash: Option<String>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Audius user snapshots
// =============================================================================

/// Per-user profile metadata snapshot, one row per mutation clock.
#[derive(Debug, Clone, FromRow)]
pub struct AudiusUserRow {
    pub user_uuid: Uuid,
    pub clock: i64,
    pub metadata_multihash: String,
    pub cover_photo: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: OffsetDateTime,
}
