//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::ContentStore;
use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::Cid;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem content store.
///
/// Content lives at `<root>/<hex[0:2]>/<hex>`. Writes go to a temp file in
/// the root and are renamed into place, so readers never observe a partial
/// object and concurrent writers of the same CID converge on identical bytes.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn cid_path(&self, cid: &Cid) -> PathBuf {
        // storage_key() is hex-derived, so it can never contain traversal
        // components; no canonicalization pass is needed here.
        self.root.join(cid.storage_key())
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, cid: &Cid) -> StorageResult<bool> {
        fs::try_exists(&self.cid_path(cid))
            .await
            .map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, cid: &Cid) -> StorageResult<Bytes> {
        match fs::read(&self.cid_path(cid)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(cid.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", len = data.len()))]
    async fn put_verified(&self, cid: &Cid, data: Bytes) -> StorageResult<String> {
        if !cid.matches(&data) {
            return Err(StorageError::HashMismatch {
                expected: cid.to_string(),
                actual: Cid::compute(&data).to_string(),
            });
        }

        let path = self.cid_path(cid);
        if fs::try_exists(&path).await? {
            return Ok(path.display().to_string());
        }
        self.ensure_parent(&path).await?;

        let tmp = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::Io(e));
        }
        Ok(path.display().to_string())
    }

    fn path_for(&self, cid: &Cid) -> String {
        self.cid_path(cid).display().to_string()
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, cid: &Cid) -> StorageResult<()> {
        match fs::remove_file(&self.cid_path(cid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        let probe = self.root.join(format!(".health-{}", Uuid::new_v4()));
        fs::write(&probe, b"ok").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let temp = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        (temp, backend)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (_temp, store) = backend().await;
        let data = Bytes::from_static(b"some track bytes");
        let cid = Cid::compute(&data);

        let path = store.put_verified(&cid, data.clone()).await.unwrap();
        assert_eq!(path, store.path_for(&cid));
        assert!(store.exists(&cid).await.unwrap());
        assert_eq!(store.get(&cid).await.unwrap(), data);
    }

    #[tokio::test]
    async fn put_rejects_wrong_hash() {
        let (_temp, store) = backend().await;
        let cid = Cid::compute(b"expected");

        let err = store
            .put_verified(&cid, Bytes::from_static(b"actual"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }));
        assert!(!store.exists(&cid).await.unwrap());
    }

    #[tokio::test]
    async fn put_is_write_once() {
        let (_temp, store) = backend().await;
        let data = Bytes::from_static(b"idempotent");
        let cid = Cid::compute(&data);

        store.put_verified(&cid, data.clone()).await.unwrap();
        store.put_verified(&cid, data.clone()).await.unwrap();
        assert_eq!(store.get(&cid).await.unwrap(), data);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_temp, store) = backend().await;
        let err = store.get(&Cid::compute(b"nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let (_temp, store) = backend().await;
        store.delete(&Cid::compute(b"nope")).await.unwrap();
    }

    #[tokio::test]
    async fn keys_are_sharded_on_disk() {
        let (temp, store) = backend().await;
        let data = Bytes::from_static(b"sharded content");
        let cid = Cid::compute(&data);

        store.put_verified(&cid, data).await.unwrap();
        let hex = cid.to_hex();
        assert!(temp.path().join(&hex[..2]).join(&hex).exists());
    }
}
