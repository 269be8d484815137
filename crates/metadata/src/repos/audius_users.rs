//! Audius-user snapshot repository.

use crate::error::MetadataResult;
use crate::models::AudiusUserRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for per-user profile metadata snapshots.
#[async_trait]
pub trait AudiusUserRepo: Send + Sync {
    /// All snapshot rows for a user, ordered by clock.
    async fn get_audius_users_for_user(&self, user_uuid: Uuid)
    -> MetadataResult<Vec<AudiusUserRow>>;
}
