//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AudiusUserRepo, ClockRepo, FileRepo, TrackRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UserRepo + ClockRepo + FileRepo + TrackRepo + AudiusUserRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_uuid BLOB PRIMARY KEY,
    wallet_public_key TEXT NOT NULL UNIQUE,
    clock INTEGER NOT NULL,
    latest_block_number INTEGER NOT NULL DEFAULT 0,
    last_login TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clock_records (
    user_uuid BLOB NOT NULL REFERENCES users(user_uuid) ON DELETE CASCADE,
    clock INTEGER NOT NULL,
    source_table TEXT NOT NULL,
    source_row_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_uuid, clock)
);

CREATE TABLE IF NOT EXISTS files (
    file_uuid BLOB PRIMARY KEY,
    user_uuid BLOB NOT NULL REFERENCES users(user_uuid) ON DELETE CASCADE,
    clock INTEGER NOT NULL,
    multihash TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    file_type TEXT NOT NULL,
    track_blockchain_id INTEGER,
    dir_multihash TEXT,
    file_name TEXT,
    size_bytes INTEGER,
    skipped INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (user_uuid, clock)
);

CREATE INDEX IF NOT EXISTS idx_files_skipped ON files (skipped, created_at);

CREATE TABLE IF NOT EXISTS tracks (
    track_blockchain_id INTEGER NOT NULL,
    user_uuid BLOB NOT NULL REFERENCES users(user_uuid) ON DELETE CASCADE,
    clock INTEGER NOT NULL,
    metadata_multihash TEXT NOT NULL,
    cover_art_multihash TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (track_blockchain_id, user_uuid)
);

CREATE INDEX IF NOT EXISTS idx_tracks_user_clock ON tracks (user_uuid, clock);

CREATE TABLE IF NOT EXISTS audius_users (
    user_uuid BLOB NOT NULL REFERENCES users(user_uuid) ON DELETE CASCADE,
    clock INTEGER NOT NULL,
    metadata_multihash TEXT NOT NULL,
    cover_photo TEXT,
    profile_picture TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_uuid, clock)
);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("create db directory: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under load.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::clock::{ExportSlice, Mutation, SyncCommit};
    use chorus_core::{CLOCK_UNKNOWN, WalletKey};
    use sqlx::{Sqlite, Transaction};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn get_user(&self, wallet: &WalletKey) -> MetadataResult<Option<UserRow>> {
            let row =
                sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE wallet_public_key = ?")
                    .bind(wallet.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_user_by_uuid(&self, user_uuid: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_uuid = ?")
                .bind(user_uuid)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn local_clock(&self, wallet: &WalletKey) -> MetadataResult<i64> {
            let clock: Option<i64> =
                sqlx::query_scalar("SELECT clock FROM users WHERE wallet_public_key = ?")
                    .bind(wallet.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(clock.unwrap_or(CLOCK_UNKNOWN))
        }
    }

    /// Insert one clock-log row inside an open transaction.
    async fn insert_clock_record(
        tx: &mut Transaction<'_, Sqlite>,
        user_uuid: Uuid,
        clock: i64,
        source_table: &str,
        source_row_id: &str,
        created_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO clock_records (user_uuid, clock, source_table, source_row_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_uuid)
        .bind(clock)
        .bind(source_table)
        .bind(source_row_id)
        .bind(created_at)
        .execute(&mut **tx)
        .await
        .map_err(MetadataError::from_sqlx)?;
        Ok(())
    }

    #[async_trait]
    impl ClockRepo for SqliteStore {
        async fn append(&self, wallet: &WalletKey, mutations: &[Mutation]) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;

            let existing =
                sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE wallet_public_key = ?")
                    .bind(wallet.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            let (user_uuid, old_clock) = match &existing {
                Some(user) => (user.user_uuid, user.clock),
                None => (Uuid::new_v4(), CLOCK_UNKNOWN),
            };

            if mutations.is_empty() {
                return Ok(old_clock);
            }

            let now = OffsetDateTime::now_utc();
            let new_clock = old_clock + mutations.len() as i64;

            // The user row is written last so a brand-new user only ever
            // becomes visible with a clock its log already covers.
            match &existing {
                Some(_) => {
                    let result = sqlx::query(
                        "UPDATE users SET clock = ?, updated_at = ? \
                         WHERE user_uuid = ? AND clock = ?",
                    )
                    .bind(new_clock)
                    .bind(now)
                    .bind(user_uuid)
                    .bind(old_clock)
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        let found: i64 =
                            sqlx::query_scalar("SELECT clock FROM users WHERE user_uuid = ?")
                                .bind(user_uuid)
                                .fetch_one(&mut *tx)
                                .await?;
                        return Err(MetadataError::ClockGap {
                            wallet: wallet.to_string(),
                            expected: old_clock,
                            found,
                        });
                    }
                }
                None => {
                    sqlx::query(
                        "INSERT INTO users (user_uuid, wallet_public_key, clock, \
                         latest_block_number, last_login, created_at, updated_at) \
                         VALUES (?, ?, ?, 0, NULL, ?, ?)",
                    )
                    .bind(user_uuid)
                    .bind(wallet.as_str())
                    .bind(new_clock)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(MetadataError::from_sqlx)?;
                }
            }

            for (i, mutation) in mutations.iter().enumerate() {
                let clock = old_clock + 1 + i as i64;
                match mutation {
                    Mutation::Track {
                        track_blockchain_id,
                        metadata_multihash,
                        cover_art_multihash,
                    } => {
                        sqlx::query(
                            "INSERT INTO tracks (track_blockchain_id, user_uuid, clock, \
                             metadata_multihash, cover_art_multihash, created_at) \
                             VALUES (?, ?, ?, ?, ?, ?) \
                             ON CONFLICT (track_blockchain_id, user_uuid) DO UPDATE SET \
                             clock = excluded.clock, \
                             metadata_multihash = excluded.metadata_multihash, \
                             cover_art_multihash = excluded.cover_art_multihash",
                        )
                        .bind(track_blockchain_id)
                        .bind(user_uuid)
                        .bind(clock)
                        .bind(metadata_multihash)
                        .bind(cover_art_multihash)
                        .bind(now)
                        .execute(&mut *tx)
                        .await
                        .map_err(MetadataError::from_sqlx)?;
                        insert_clock_record(
                            &mut tx,
                            user_uuid,
                            clock,
                            "tracks",
                            &track_blockchain_id.to_string(),
                            now,
                        )
                        .await?;
                    }
                    Mutation::File {
                        multihash,
                        storage_path,
                        file_type,
                        track_blockchain_id,
                        dir_multihash,
                        file_name,
                        size_bytes,
                        skipped,
                    } => {
                        let file_uuid = Uuid::new_v4();
                        sqlx::query(
                            "INSERT INTO files (file_uuid, user_uuid, clock, multihash, \
                             storage_path, file_type, track_blockchain_id, dir_multihash, \
                             file_name, size_bytes, skipped, created_at) \
                             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        )
                        .bind(file_uuid)
                        .bind(user_uuid)
                        .bind(clock)
                        .bind(multihash)
                        .bind(storage_path)
                        .bind(file_type.as_str())
                        .bind(track_blockchain_id)
                        .bind(dir_multihash)
                        .bind(file_name)
                        .bind(size_bytes)
                        .bind(skipped)
                        .bind(now)
                        .execute(&mut *tx)
                        .await
                        .map_err(MetadataError::from_sqlx)?;
                        insert_clock_record(
                            &mut tx,
                            user_uuid,
                            clock,
                            "files",
                            &file_uuid.to_string(),
                            now,
                        )
                        .await?;
                    }
                    Mutation::AudiusUser {
                        metadata_multihash,
                        cover_photo,
                        profile_picture,
                    } => {
                        sqlx::query(
                            "INSERT INTO audius_users (user_uuid, clock, metadata_multihash, \
                             cover_photo, profile_picture, created_at) \
                             VALUES (?, ?, ?, ?, ?, ?)",
                        )
                        .bind(user_uuid)
                        .bind(clock)
                        .bind(metadata_multihash)
                        .bind(cover_photo)
                        .bind(profile_picture)
                        .bind(now)
                        .execute(&mut *tx)
                        .await
                        .map_err(MetadataError::from_sqlx)?;
                        insert_clock_record(
                            &mut tx,
                            user_uuid,
                            clock,
                            "audius_users",
                            &user_uuid.to_string(),
                            now,
                        )
                        .await?;
                    }
                }
            }

            tx.commit().await?;
            Ok(new_clock)
        }

        async fn export_slice(
            &self,
            wallet: &WalletKey,
            clock_min: i64,
            window: i64,
        ) -> MetadataResult<Option<ExportSlice>> {
            let user = match self.get_user(wallet).await? {
                Some(user) => user,
                None => return Ok(None),
            };

            // Past the user's clock: the empty slice signals "already up to date".
            if clock_min > user.clock {
                return Ok(Some(ExportSlice {
                    clock: user.clock,
                    user,
                    clock_records: vec![],
                    files: vec![],
                    tracks: vec![],
                    audius_users: vec![],
                }));
            }

            let clock_max = user.clock.min(clock_min + window);

            let clock_records = sqlx::query_as::<_, ClockRecordRow>(
                "SELECT * FROM clock_records WHERE user_uuid = ? AND clock BETWEEN ? AND ? \
                 ORDER BY clock",
            )
            .bind(user.user_uuid)
            .bind(clock_min)
            .bind(clock_max)
            .fetch_all(&self.pool)
            .await?;

            let files = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE user_uuid = ? AND clock BETWEEN ? AND ? ORDER BY clock",
            )
            .bind(user.user_uuid)
            .bind(clock_min)
            .bind(clock_max)
            .fetch_all(&self.pool)
            .await?;

            let tracks = sqlx::query_as::<_, TrackRow>(
                "SELECT * FROM tracks WHERE user_uuid = ? AND clock BETWEEN ? AND ? ORDER BY clock",
            )
            .bind(user.user_uuid)
            .bind(clock_min)
            .bind(clock_max)
            .fetch_all(&self.pool)
            .await?;

            let audius_users = sqlx::query_as::<_, AudiusUserRow>(
                "SELECT * FROM audius_users WHERE user_uuid = ? AND clock BETWEEN ? AND ? \
                 ORDER BY clock",
            )
            .bind(user.user_uuid)
            .bind(clock_min)
            .bind(clock_max)
            .fetch_all(&self.pool)
            .await?;

            Ok(Some(ExportSlice {
                clock: clock_max,
                user,
                clock_records,
                files,
                tracks,
                audius_users,
            }))
        }

        async fn truncate_user(&self, wallet: &WalletKey) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let user_uuid: Option<Uuid> =
                sqlx::query_scalar("SELECT user_uuid FROM users WHERE wallet_public_key = ?")
                    .bind(wallet.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some(user_uuid) = user_uuid else {
                return Ok(());
            };

            // Explicit deletes rather than relying on cascade so the
            // operation stays correct even with foreign keys disabled.
            for table in ["clock_records", "files", "tracks", "audius_users"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE user_uuid = ?"))
                    .bind(user_uuid)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("DELETE FROM users WHERE user_uuid = ?")
                .bind(user_uuid)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn commit_sync(&self, commit: &SyncCommit) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let existing =
                sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE wallet_public_key = ?")
                    .bind(commit.wallet.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            // Commit-time invariant: the incoming records must extend the
            // local dense sequence exactly.
            if let Some(first) = commit.clock_records.first() {
                let expected = existing.as_ref().map(|u| u.clock + 1).unwrap_or(0);
                if first.clock != expected {
                    return Err(MetadataError::Constraint(format!(
                        "sync commit for {} starts at clock {} but local log ends at {}",
                        commit.wallet,
                        first.clock,
                        expected - 1
                    )));
                }
            }

            let now = OffsetDateTime::now_utc();
            let user_uuid = existing
                .as_ref()
                .map(|u| u.user_uuid)
                .unwrap_or_else(Uuid::new_v4);

            sqlx::query(
                "INSERT INTO users (user_uuid, wallet_public_key, clock, latest_block_number, \
                 last_login, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (wallet_public_key) DO UPDATE SET \
                 clock = excluded.clock, \
                 latest_block_number = excluded.latest_block_number, \
                 last_login = excluded.last_login, \
                 updated_at = excluded.updated_at",
            )
            .bind(user_uuid)
            .bind(commit.wallet.as_str())
            .bind(commit.clock)
            .bind(commit.latest_block_number)
            .bind(commit.last_login)
            .bind(commit.created_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(MetadataError::from_sqlx)?;

            for record in &commit.clock_records {
                insert_clock_record(
                    &mut tx,
                    user_uuid,
                    record.clock,
                    &record.source_table,
                    &record.source_row_id,
                    record.created_at,
                )
                .await?;
            }

            for file in &commit.files {
                sqlx::query(
                    "INSERT INTO files (file_uuid, user_uuid, clock, multihash, storage_path, \
                     file_type, track_blockchain_id, dir_multihash, file_name, size_bytes, \
                     skipped, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4())
                .bind(user_uuid)
                .bind(file.wire.clock)
                .bind(&file.wire.multihash)
                .bind(&file.storage_path)
                .bind(file.wire.file_type.as_str())
                .bind(file.wire.track_blockchain_id)
                .bind(&file.wire.dir_multihash)
                .bind(&file.wire.file_name)
                .bind(file.wire.size_bytes)
                .bind(file.skipped)
                .bind(file.wire.created_at)
                .execute(&mut *tx)
                .await
                .map_err(MetadataError::from_sqlx)?;
            }

            for track in &commit.tracks {
                sqlx::query(
                    "INSERT INTO tracks (track_blockchain_id, user_uuid, clock, \
                     metadata_multihash, cover_art_multihash, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (track_blockchain_id, user_uuid) DO UPDATE SET \
                     clock = excluded.clock, \
                     metadata_multihash = excluded.metadata_multihash, \
                     cover_art_multihash = excluded.cover_art_multihash",
                )
                .bind(track.track_blockchain_id)
                .bind(user_uuid)
                .bind(track.clock)
                .bind(&track.metadata_multihash)
                .bind(&track.cover_art_multihash)
                .bind(track.created_at)
                .execute(&mut *tx)
                .await
                .map_err(MetadataError::from_sqlx)?;
            }

            for snapshot in &commit.audius_users {
                sqlx::query(
                    "INSERT INTO audius_users (user_uuid, clock, metadata_multihash, \
                     cover_photo, profile_picture, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(user_uuid)
                .bind(snapshot.clock)
                .bind(&snapshot.metadata_multihash)
                .bind(&snapshot.cover_photo)
                .bind(&snapshot.profile_picture)
                .bind(snapshot.created_at)
                .execute(&mut *tx)
                .await
                .map_err(MetadataError::from_sqlx)?;
            }

            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn get_files_for_user(&self, user_uuid: Uuid) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE user_uuid = ? ORDER BY clock",
            )
            .bind(user_uuid)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_skipped_files(&self, limit: u32) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE skipped = 1 ORDER BY created_at LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn clear_skipped(&self, file_uuid: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE files SET skipped = 0 WHERE file_uuid = ?")
                .bind(file_uuid)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "file_uuid {file_uuid} not found"
                )));
            }
            Ok(())
        }

        async fn get_file_in_dir(
            &self,
            dir_multihash: &str,
            file_name: &str,
        ) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE dir_multihash = ? AND file_name = ? \
                 ORDER BY clock DESC LIMIT 1",
            )
            .bind(dir_multihash)
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl TrackRepo for SqliteStore {
        async fn get_tracks_for_user(&self, user_uuid: Uuid) -> MetadataResult<Vec<TrackRow>> {
            let rows = sqlx::query_as::<_, TrackRow>(
                "SELECT * FROM tracks WHERE user_uuid = ? ORDER BY clock",
            )
            .bind(user_uuid)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl AudiusUserRepo for SqliteStore {
        async fn get_audius_users_for_user(
            &self,
            user_uuid: Uuid,
        ) -> MetadataResult<Vec<AudiusUserRow>> {
            let rows = sqlx::query_as::<_, AudiusUserRow>(
                "SELECT * FROM audius_users WHERE user_uuid = ? ORDER BY clock",
            )
            .bind(user_uuid)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}
