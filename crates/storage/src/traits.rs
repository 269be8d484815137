//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::Cid;

/// Content-addressed store abstraction.
///
/// Keys are CID storage keys (`<hex[0:2]>/<hex>`); writes are write-once, so
/// concurrent puts of the same CID are safe and puts of distinct CIDs never
/// contend.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Check whether content for a CID is present.
    async fn exists(&self, cid: &Cid) -> StorageResult<bool>;

    /// Read the content for a CID.
    async fn get(&self, cid: &Cid) -> StorageResult<Bytes>;

    /// Write content atomically, verifying that it hashes to `cid`.
    ///
    /// Returns the node-local path the bytes live at. An existing object for
    /// the same CID is left untouched.
    async fn put_verified(&self, cid: &Cid, data: Bytes) -> StorageResult<String>;

    /// The path `put_verified` would store a CID at, without writing.
    fn path_for(&self, cid: &Cid) -> String;

    /// Delete content for a CID. Missing content is not an error.
    async fn delete(&self, cid: &Cid) -> StorageResult<()>;

    /// Verify the backend is usable (reachable, writable).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
