//! Application state shared across handlers and background tasks.

use crate::sync::client::PeerClient;
use crate::sync::history::SyncHistory;
use chorus_chain::ChainClient;
use chorus_coord::{CoordStore, JobQueue, SyncLock};
use chorus_core::config::AppConfig;
use chorus_metadata::MetadataStore;
use chorus_signer::RequestSigner;
use chorus_storage::ContentStore;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Node identity as seen by chain-dependent components.
///
/// The sp id starts unknown; identity bootstrap fills it in. Everything that
/// talks to the chain pattern-matches on this and rejects with
/// `bootstrap_pending` while it is still `Bootstrapping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeIdentity {
    Bootstrapping,
    Ready { sp_id: u64 },
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store (clock log + entity tables).
    pub metadata: Arc<dyn MetadataStore>,
    /// Content-addressed storage backend.
    pub storage: Arc<dyn ContentStore>,
    /// Coordination store (locks, counters, job status).
    pub coord: Arc<dyn CoordStore>,
    /// Chain oracle.
    pub chain: Arc<dyn ChainClient>,
    /// Delegate-key signer for inter-node requests.
    pub signer: Arc<RequestSigner>,
    /// Node identity, filled in by bootstrap.
    pub identity: Arc<RwLock<NodeIdentity>>,
    /// Async job queue.
    pub queue: Arc<JobQueue>,
    /// Per-user sync lock acquirer.
    pub sync_lock: SyncLock,
    /// In-process sync outcome aggregator.
    pub history: Arc<SyncHistory>,
    /// HTTP client for peer nodes.
    pub peers: PeerClient,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ContentStore>,
        coord: Arc<dyn CoordStore>,
        chain: Arc<dyn ChainClient>,
        signer: RequestSigner,
    ) -> Self {
        let sync_lock = SyncLock::new(coord.clone(), config.sync.lock_ttl());
        let queue = Arc::new(JobQueue::new(coord.clone(), config.sync.status_ttl()));
        let peers = PeerClient::new(&config.sync, &config.snapback);
        Self {
            config: Arc::new(config),
            metadata,
            storage,
            coord,
            chain,
            signer: Arc::new(signer),
            identity: Arc::new(RwLock::new(NodeIdentity::Bootstrapping)),
            queue,
            sync_lock,
            history: Arc::new(SyncHistory::new()),
            peers,
        }
    }

    /// This node's advertised endpoint.
    pub fn endpoint(&self) -> &str {
        &self.config.node.creator_node_endpoint
    }

    /// The bootstrapped sp id, or `None` while bootstrapping.
    pub async fn sp_id(&self) -> Option<u64> {
        match *self.identity.read().await {
            NodeIdentity::Ready { sp_id } => Some(sp_id),
            NodeIdentity::Bootstrapping => None,
        }
    }

    /// Mark bootstrap complete.
    pub async fn set_ready(&self, sp_id: u64) {
        *self.identity.write().await = NodeIdentity::Ready { sp_id };
    }
}
