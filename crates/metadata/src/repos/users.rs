//! User repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;
use chorus_core::WalletKey;
use uuid::Uuid;

/// Repository for user record lookups.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Get a user by wallet public key.
    async fn get_user(&self, wallet: &WalletKey) -> MetadataResult<Option<UserRow>>;

    /// Get a user by node-local uuid.
    async fn get_user_by_uuid(&self, user_uuid: Uuid) -> MetadataResult<Option<UserRow>>;

    /// The user's current clock, or [`chorus_core::CLOCK_UNKNOWN`] when the
    /// user has no local record.
    async fn local_clock(&self, wallet: &WalletKey) -> MetadataResult<i64>;
}
