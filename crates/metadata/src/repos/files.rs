//! File repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for content file descriptors.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// All file rows for a user, ordered by clock.
    async fn get_files_for_user(&self, user_uuid: Uuid) -> MetadataResult<Vec<FileRow>>;

    /// A bounded batch of skipped files across all users, oldest first.
    /// Input to the retry loop.
    async fn get_skipped_files(&self, limit: u32) -> MetadataResult<Vec<FileRow>>;

    /// Clear the skipped flag after the content has been fetched and
    /// verified against the row's multihash.
    async fn clear_skipped(&self, file_uuid: Uuid) -> MetadataResult<()>;

    /// Resolve a named file inside a directory object, for the
    /// directory-form content route.
    async fn get_file_in_dir(
        &self,
        dir_multihash: &str,
        file_name: &str,
    ) -> MetadataResult<Option<FileRow>>;
}
