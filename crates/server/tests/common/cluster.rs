//! Multi-node test cluster utilities.
//!
//! Each test node is a full creator node: SQLite metadata in a tempdir,
//! filesystem content storage, in-memory coordination store, the shared
//! mock chain, and the real router served on an ephemeral TCP port so
//! cross-node sync exercises actual HTTP.

use chorus_chain::{ChainClient, MockChainClient, ReplicaSet};
use chorus_coord::CoordStore;
use chorus_core::WalletKey;
use chorus_core::config::AppConfig;
use chorus_metadata::{MetadataStore, SqliteStore};
use chorus_server::sync::executor::handle_sync_job;
use chorus_server::sync::{SYNC_TASK, SyncJobParams};
use chorus_server::{AppState, bootstrap, create_router};
use chorus_signer::{KeyPair, RequestSigner};
use chorus_storage::FilesystemBackend;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// One running node in the test cluster.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestNode {
    pub state: AppState,
    /// Advertised endpoint, e.g. "http://127.0.0.1:49152".
    pub endpoint: String,
    pub sp_id: u64,
    /// Concrete metadata handle for tests that reach below the trait.
    pub sqlite: Arc<SqliteStore>,
    _temp_dir: TempDir,
    _server: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl TestNode {
    /// Spawn a full node registered on the shared mock chain as `sp_id`.
    pub async fn spawn(chain: &Arc<MockChainClient>, sp_id: u64) -> Self {
        Self::spawn_with_config(chain, sp_id, |_| {}).await
    }

    /// Spawn a node with test-config modifications applied before wiring.
    pub async fn spawn_with_config<F>(
        chain: &Arc<MockChainClient>,
        sp_id: u64,
        modify: F,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");

        // Bind first so the advertised endpoint carries the real port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let mut config = AppConfig::for_testing(temp_dir.path());
        config.node.creator_node_endpoint = endpoint.clone();
        modify(&mut config);

        let sqlite = Arc::new(
            SqliteStore::new(temp_dir.path().join("metadata.db"))
                .await
                .expect("failed to create metadata store"),
        );
        let metadata: Arc<dyn MetadataStore> = sqlite.clone();
        let storage = Arc::new(
            FilesystemBackend::new(temp_dir.path().join("content"))
                .await
                .expect("failed to create content storage"),
        );
        let coord: Arc<dyn CoordStore> = Arc::new(chorus_coord::MemoryCoordStore::new());
        let signer = RequestSigner::new(KeyPair::generate());

        // Register on chain up front so bootstrap resolves immediately.
        chain
            .add_service_provider(sp_id, &endpoint, &signer.public_key_hex())
            .await;
        chain.set_registry_deployed(true).await;

        let chain_dyn: Arc<dyn ChainClient> = chain.clone();
        let state = AppState::new(config, metadata, storage, coord, chain_dyn, signer);

        let sync_state = state.clone();
        state
            .queue
            .process(SYNC_TASK, 4, move |job| {
                let state = sync_state.clone();
                async move { handle_sync_job(state, job).await }
            })
            .await;

        bootstrap::run(&state).await.expect("bootstrap failed");

        let app = create_router(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server died");
        });

        Self {
            state,
            endpoint,
            sp_id,
            sqlite,
            _temp_dir: temp_dir,
            _server: server,
        }
    }

    /// Send this node a signed sync request on behalf of `from`.
    pub async fn request_sync_from(
        &self,
        from: &TestNode,
        wallet: &WalletKey,
        force_resync: bool,
    ) -> Uuid {
        let params = SyncJobParams {
            wallet: vec![wallet.clone()],
            creator_node_endpoint: from.endpoint.clone(),
            block_number: None,
            force_resync,
        };
        from.state
            .peers
            .request_sync(&self.endpoint, &from.state.signer, from.sp_id, &params)
            .await
            .expect("sync request failed")
    }

    /// The local clock this node has for a wallet.
    pub async fn clock(&self, wallet: &WalletKey) -> i64 {
        self.state.metadata.local_clock(wallet).await.unwrap()
    }
}

/// Seed a replica set on the mock chain.
#[allow(dead_code)]
pub async fn set_replica_set(
    chain: &Arc<MockChainClient>,
    wallet: &WalletKey,
    primary: u64,
    secondaries: [u64; 2],
) {
    chain
        .set_replica_set(
            wallet,
            ReplicaSet {
                primary,
                secondaries,
            },
        )
        .await;
}

/// Register an sp id whose endpoint nothing listens on.
#[allow(dead_code)]
pub async fn add_dead_provider(chain: &Arc<MockChainClient>, sp_id: u64) -> String {
    let endpoint = "http://127.0.0.1:9".to_string();
    chain
        .add_service_provider(sp_id, &endpoint, &hex::encode([0u8; 32]))
        .await;
    endpoint
}

/// Poll until the node's clock for a wallet reaches `expected`.
#[allow(dead_code)]
pub async fn wait_for_clock(node: &TestNode, wallet: &WalletKey, expected: i64) {
    for _ in 0..200 {
        if node.clock(wallet).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!(
        "node {} never reached clock {expected} for {wallet} (at {})",
        node.endpoint,
        node.clock(wallet).await
    );
}

/// Poll a job on a node until it leaves IN_PROGRESS.
#[allow(dead_code)]
pub async fn wait_for_job(node: &TestNode, job_id: Uuid) -> chorus_coord::JobStatus {
    for _ in 0..200 {
        let status = node
            .state
            .queue
            .status(SYNC_TASK, &job_id.to_string())
            .await
            .unwrap();
        if let Some(status) = status
            && status != chorus_coord::JobStatus::InProgress
        {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} never finished");
}
