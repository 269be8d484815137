//! The chain oracle interface.
//!
//! The chain is consumed as an opaque oracle: it maps endpoints to
//! service-provider ids, users to replica sets, and accepts registrations
//! and reconfiguration proposals. Everything behind this trait (RPC
//! transport, contracts, confirmation depth) is someone else's problem.

use crate::error::ChainResult;
use async_trait::async_trait;
use chorus_core::WalletKey;
use serde::{Deserialize, Serialize};

/// A registered content node as the chain sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub sp_id: u64,
    pub endpoint: String,
    /// Hex-encoded ed25519 public key the provider signs requests with.
    pub delegate_public_key: String,
}

/// A user's replica set: the primary accepts writes, both secondaries
/// converge to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    pub primary: u64,
    pub secondaries: [u64; 2],
}

impl ReplicaSet {
    /// All three member sp ids, primary first.
    pub fn members(&self) -> [u64; 3] {
        [self.primary, self.secondaries[0], self.secondaries[1]]
    }

    pub fn contains(&self, sp_id: u64) -> bool {
        self.members().contains(&sp_id)
    }
}

/// Read/write surface of the on-chain registries this node depends on.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Resolve an advertised endpoint to its service-provider id.
    /// Returns 0 while the endpoint is unregistered.
    async fn sp_id_for_endpoint(&self, endpoint: &str) -> ChainResult<u64>;

    /// Look up a service provider by id.
    async fn service_provider(&self, sp_id: u64) -> ChainResult<Option<ServiceProvider>>;

    /// All registered service providers.
    async fn list_service_providers(&self) -> ChainResult<Vec<ServiceProvider>>;

    /// The current replica set for a user, if one is recorded.
    async fn replica_set_for_user(&self, wallet: &WalletKey) -> ChainResult<Option<ReplicaSet>>;

    /// Wallets whose replica set names `sp_id` as primary.
    async fn users_with_primary(&self, sp_id: u64) -> ChainResult<Vec<WalletKey>>;

    /// Whether the replica-set registry contract is deployed yet.
    async fn registry_deployed(&self) -> ChainResult<bool>;

    /// Register this node on the replica-set registry.
    async fn register(
        &self,
        sp_id: u64,
        endpoint: &str,
        delegate_public_key: &str,
    ) -> ChainResult<()>;

    /// Propose swapping an unhealthy secondary for a replacement in a
    /// user's replica set. Idempotent: proposing a swap whose unhealthy
    /// member is no longer in the set is a no-op.
    async fn propose_reconfiguration(
        &self,
        wallet: &WalletKey,
        unhealthy_sp_id: u64,
        replacement_sp_id: u64,
    ) -> ChainResult<()>;
}
