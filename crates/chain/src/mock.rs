//! In-memory chain oracle for dev mode and tests.

use crate::client::{ChainClient, ReplicaSet, ServiceProvider};
use crate::error::ChainResult;
use async_trait::async_trait;
use chorus_core::WalletKey;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    providers: BTreeMap<u64, ServiceProvider>,
    replica_sets: HashMap<WalletKey, ReplicaSet>,
    registry_deployed: bool,
    proposals: Vec<(WalletKey, u64, u64)>,
}

/// Mock chain: a mutable in-process registry with immediate confirmation.
///
/// Reconfiguration proposals apply instantly, which models the
/// "chain confirms" step of the state machine without a consensus delay.
#[derive(Default)]
pub struct MockChainClient {
    inner: Mutex<Inner>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registered service provider.
    pub async fn add_service_provider(&self, sp_id: u64, endpoint: &str, delegate_public_key: &str) {
        let mut inner = self.inner.lock().await;
        inner.providers.insert(
            sp_id,
            ServiceProvider {
                sp_id,
                endpoint: endpoint.to_string(),
                delegate_public_key: delegate_public_key.to_string(),
            },
        );
    }

    /// Seed or overwrite a user's replica set.
    pub async fn set_replica_set(&self, wallet: &WalletKey, replica_set: ReplicaSet) {
        let mut inner = self.inner.lock().await;
        inner.replica_sets.insert(wallet.clone(), replica_set);
    }

    pub async fn set_registry_deployed(&self, deployed: bool) {
        self.inner.lock().await.registry_deployed = deployed;
    }

    /// Reconfiguration proposals observed so far, in order.
    pub async fn proposals(&self) -> Vec<(WalletKey, u64, u64)> {
        self.inner.lock().await.proposals.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn sp_id_for_endpoint(&self, endpoint: &str) -> ChainResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .providers
            .values()
            .find(|sp| sp.endpoint == endpoint)
            .map(|sp| sp.sp_id)
            .unwrap_or(0))
    }

    async fn service_provider(&self, sp_id: u64) -> ChainResult<Option<ServiceProvider>> {
        let inner = self.inner.lock().await;
        Ok(inner.providers.get(&sp_id).cloned())
    }

    async fn list_service_providers(&self) -> ChainResult<Vec<ServiceProvider>> {
        let inner = self.inner.lock().await;
        Ok(inner.providers.values().cloned().collect())
    }

    async fn replica_set_for_user(&self, wallet: &WalletKey) -> ChainResult<Option<ReplicaSet>> {
        let inner = self.inner.lock().await;
        Ok(inner.replica_sets.get(wallet).copied())
    }

    async fn users_with_primary(&self, sp_id: u64) -> ChainResult<Vec<WalletKey>> {
        let inner = self.inner.lock().await;
        let mut wallets: Vec<WalletKey> = inner
            .replica_sets
            .iter()
            .filter(|(_, rs)| rs.primary == sp_id)
            .map(|(wallet, _)| wallet.clone())
            .collect();
        wallets.sort();
        Ok(wallets)
    }

    async fn registry_deployed(&self) -> ChainResult<bool> {
        Ok(self.inner.lock().await.registry_deployed)
    }

    async fn register(
        &self,
        sp_id: u64,
        endpoint: &str,
        delegate_public_key: &str,
    ) -> ChainResult<()> {
        let mut inner = self.inner.lock().await;
        inner.providers.insert(
            sp_id,
            ServiceProvider {
                sp_id,
                endpoint: endpoint.to_string(),
                delegate_public_key: delegate_public_key.to_string(),
            },
        );
        Ok(())
    }

    async fn propose_reconfiguration(
        &self,
        wallet: &WalletKey,
        unhealthy_sp_id: u64,
        replacement_sp_id: u64,
    ) -> ChainResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(replica_set) = inner.replica_sets.get(wallet).copied() else {
            return Ok(());
        };
        // Idempotency: a proposal against an already-replaced member is a no-op.
        if !replica_set.secondaries.contains(&unhealthy_sp_id) {
            return Ok(());
        }
        let mut updated = replica_set;
        for slot in updated.secondaries.iter_mut() {
            if *slot == unhealthy_sp_id {
                *slot = replacement_sp_id;
            }
        }
        inner.replica_sets.insert(wallet.clone(), updated);
        inner
            .proposals
            .push((wallet.clone(), unhealthy_sp_id, replacement_sp_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletKey {
        WalletKey::parse("0xaa").unwrap()
    }

    #[tokio::test]
    async fn endpoint_resolution() {
        let chain = MockChainClient::new();
        assert_eq!(chain.sp_id_for_endpoint("http://a").await.unwrap(), 0);
        chain.add_service_provider(3, "http://a", "pk").await;
        assert_eq!(chain.sp_id_for_endpoint("http://a").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reconfiguration_swaps_secondary() {
        let chain = MockChainClient::new();
        let w = wallet();
        chain
            .set_replica_set(
                &w,
                ReplicaSet {
                    primary: 1,
                    secondaries: [2, 3],
                },
            )
            .await;

        chain.propose_reconfiguration(&w, 3, 9).await.unwrap();
        let rs = chain.replica_set_for_user(&w).await.unwrap().unwrap();
        assert_eq!(rs.secondaries, [2, 9]);

        // Re-proposing the same swap is a no-op.
        chain.propose_reconfiguration(&w, 3, 7).await.unwrap();
        let rs = chain.replica_set_for_user(&w).await.unwrap().unwrap();
        assert_eq!(rs.secondaries, [2, 9]);
        assert_eq!(chain.proposals().await.len(), 1);
    }

    #[tokio::test]
    async fn users_with_primary_filters() {
        let chain = MockChainClient::new();
        let a = WalletKey::parse("0xaa").unwrap();
        let b = WalletKey::parse("0xbb").unwrap();
        chain
            .set_replica_set(
                &a,
                ReplicaSet {
                    primary: 1,
                    secondaries: [2, 3],
                },
            )
            .await;
        chain
            .set_replica_set(
                &b,
                ReplicaSet {
                    primary: 2,
                    secondaries: [1, 3],
                },
            )
            .await;

        assert_eq!(chain.users_with_primary(1).await.unwrap(), vec![a]);
    }
}
