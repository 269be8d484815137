//! Clock log repository: the append / slice / truncate / commit surface.

use crate::error::MetadataResult;
use crate::models::{AudiusUserRow, ClockRecordRow, FileRow, TrackRow, UserRow};
use async_trait::async_trait;
use chorus_core::export::{AudiusUserWire, ClockRecordWire, FileWire, TrackWire};
use chorus_core::{FileType, WalletKey};
use time::OffsetDateTime;

/// A single entity mutation to be appended to a user's log.
///
/// Each variant lands in its entity table plus one clock-log row carrying
/// the next clock value, all inside one transaction.
#[derive(Debug, Clone)]
pub enum Mutation {
    Track {
        track_blockchain_id: i64,
        metadata_multihash: String,
        cover_art_multihash: Option<String>,
    },
    File {
        multihash: String,
        storage_path: String,
        file_type: FileType,
        track_blockchain_id: Option<i64>,
        dir_multihash: Option<String>,
        file_name: Option<String>,
        size_bytes: Option<i64>,
        skipped: bool,
    },
    AudiusUser {
        metadata_multihash: String,
        cover_photo: Option<String>,
        profile_picture: Option<String>,
    },
}

/// A contiguous slice of one user's state, as read for an export.
#[derive(Debug, Clone)]
pub struct ExportSlice {
    pub user: UserRow,
    /// Highest clock covered by this slice. Equals `user.clock` unless the
    /// export window truncated the slice, in which case the receiver
    /// commits up to here and fetches the remainder on a later round.
    pub clock: i64,
    pub clock_records: Vec<ClockRecordRow>,
    pub files: Vec<FileRow>,
    pub tracks: Vec<TrackRow>,
    pub audius_users: Vec<AudiusUserRow>,
}

/// A fetched file descriptor annotated with the local storage decision.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub wire: FileWire,
    /// Node-local path the bytes were (or will be) written to.
    pub storage_path: String,
    /// True when the bytes could not be fetched and the row is recorded as
    /// a placeholder for the retry loop.
    pub skipped: bool,
}

/// Everything the Sync Executor commits for one user in one transaction.
#[derive(Debug, Clone)]
pub struct SyncCommit {
    pub wallet: WalletKey,
    pub clock: i64,
    pub latest_block_number: i64,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub clock_records: Vec<ClockRecordWire>,
    pub files: Vec<IncomingFile>,
    pub tracks: Vec<TrackWire>,
    pub audius_users: Vec<AudiusUserWire>,
}

/// Repository for the clock log and its transactional operations.
#[async_trait]
pub trait ClockRepo: Send + Sync {
    /// Append mutations to a user's log, creating the user on first write.
    ///
    /// All entity rows and their clock-log rows commit in one transaction;
    /// the new clock values extend the user's dense sequence by exactly
    /// `mutations.len()`. Returns the user's new clock.
    ///
    /// Fails with [`crate::MetadataError::ClockGap`] if a concurrent writer
    /// advanced the clock since this transaction began, and with
    /// [`crate::MetadataError::Constraint`] on duplicate entity keys.
    async fn append(&self, wallet: &WalletKey, mutations: &[Mutation]) -> MetadataResult<i64>;

    /// Read the slice `[clock_min, min(user.clock, clock_min + window)]`
    /// of a user's log and entities.
    ///
    /// Returns `None` for unknown users. A `clock_min` past the user's
    /// clock yields the user row with empty record vectors.
    async fn export_slice(
        &self,
        wallet: &WalletKey,
        clock_min: i64,
        window: i64,
    ) -> MetadataResult<Option<ExportSlice>>;

    /// Delete every row associated with the user, including the user row.
    /// A later import mints a fresh `user_uuid`. No-op for unknown users.
    async fn truncate_user(&self, wallet: &WalletKey) -> MetadataResult<()>;

    /// Atomically apply a fetched export slice: upsert the user record
    /// (preserving the local `user_uuid`) and bulk-insert clock records and
    /// entities. Rolls back entirely on any failure.
    async fn commit_sync(&self, commit: &SyncCommit) -> MetadataResult<()>;
}
