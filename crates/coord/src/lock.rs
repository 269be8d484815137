//! Per-user exclusive sync locks.

use crate::error::CoordResult;
use crate::store::CoordStore;
use chorus_core::WalletKey;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Coordination key guarding all writes for one user.
pub fn lock_key(wallet: &WalletKey) -> String {
    format!("node_sync:{wallet}")
}

/// Acquirer of per-user exclusive locks with a TTL lease.
///
/// The TTL bounds how long a crashed holder can block a user; a live holder
/// must finish (or fail) well inside it, which the executor's hard ceiling
/// enforces.
#[derive(Clone)]
pub struct SyncLock {
    store: Arc<dyn CoordStore>,
    ttl: Duration,
}

impl SyncLock {
    pub fn new(store: Arc<dyn CoordStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to take the lock for a user. Returns `None` when already held.
    pub async fn acquire(&self, wallet: &WalletKey) -> CoordResult<Option<LockGuard>> {
        let key = lock_key(wallet);
        let token = Uuid::new_v4().to_string();
        if self.store.setnx(&key, &token, Some(self.ttl)).await? {
            Ok(Some(LockGuard {
                store: self.store.clone(),
                key,
                token,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Held lock. Released explicitly, or best-effort on drop so a panicked
/// executor cannot leave the user locked for the full TTL.
pub struct LockGuard {
    store: Arc<dyn CoordStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// Release the lock if this guard still owns it.
    pub async fn release(mut self) -> CoordResult<()> {
        self.released = true;
        release_if_owner(&self.store, &self.key, &self.token).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let store = self.store.clone();
            let key = std::mem::take(&mut self.key);
            let token = std::mem::take(&mut self.token);
            tokio::spawn(async move {
                if let Err(e) = release_if_owner(&store, &key, &token).await {
                    tracing::error!(key = %key, error = %e, "failed to release dropped sync lock");
                }
            });
        }
    }
}

/// Delete the lock only while our token is still the one stored, so a guard
/// that outlived its TTL cannot release a successor's lock.
async fn release_if_owner(store: &Arc<dyn CoordStore>, key: &str, token: &str) -> CoordResult<()> {
    if store.get(key).await?.as_deref() == Some(token) {
        store.del(key).await?;
    }
    Ok(())
}
