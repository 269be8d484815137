//! Track repository.

use crate::error::MetadataResult;
use crate::models::TrackRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for track records.
#[async_trait]
pub trait TrackRepo: Send + Sync {
    /// All track rows for a user, ordered by clock.
    async fn get_tracks_for_user(&self, user_uuid: Uuid) -> MetadataResult<Vec<TrackRow>>;
}
