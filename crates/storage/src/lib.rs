//! Content-addressed storage abstraction and backends for the chorus
//! creator node.
//!
//! This crate provides:
//! - The `ContentStore` trait: CID-keyed, hash-verified, write-once objects
//! - The local filesystem backend with `<hex[0:2]>/<hex>` sharding

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::ContentStore;

use chorus_core::config::StorageConfig;
use std::sync::Arc;

/// Create a content store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ContentStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chorus_core::Cid;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("content"),
        };

        let store = from_config(&config).await.unwrap();
        let data = Bytes::from_static(b"hi");
        let cid = Cid::compute(&data);
        store.put_verified(&cid, data).await.unwrap();
        assert!(store.exists(&cid).await.unwrap());
    }
}
