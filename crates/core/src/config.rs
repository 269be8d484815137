//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub node: NodeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub snapback: SnapbackConfig,
}

/// Identity and peering configuration for this node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The externally reachable URL this node advertises (e.g.
    /// "https://cn1.example.com"). Resolved to a service-provider ID at
    /// bootstrap.
    pub creator_node_endpoint: String,
    /// Hex-encoded ed25519 delegate private key used to sign inter-node
    /// requests. Generated ephemerally when unset (dev mode only).
    #[serde(default)]
    pub delegate_private_key: Option<String>,
    /// Dev mode shortens bootstrap polling intervals and lets export
    /// requests from unidentified callers through, for locally wired
    /// clusters.
    #[serde(default)]
    pub dev_mode: bool,
    /// Storage fill percentage past which this node should stop being
    /// assigned new users.
    #[serde(default = "default_max_storage_used_percent")]
    pub max_storage_used_percent: u8,
    /// When set, only these peer endpoints may request exports or syncs.
    #[serde(default)]
    pub peer_whitelist: Option<Vec<String>>,
    /// Peer endpoints that are never accepted, whitelist or not.
    #[serde(default)]
    pub peer_blacklist: Vec<String>,
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Content storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage rooted at `path`.
    Filesystem { path: PathBuf },
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// Embedded SQLite database at `path`.
    Sqlite { path: PathBuf },
}

/// Sync executor and job queue tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Files fetched concurrently within one sync job.
    #[serde(default = "default_file_save_max_concurrency")]
    pub file_save_max_concurrency: usize,
    /// Consecutive failed attempts for a user before failed CIDs are
    /// recorded as skipped instead of failing the job.
    #[serde(default = "default_max_failure_count_before_skip")]
    pub max_failure_count_before_skip: u32,
    /// Width of the clock window served per export request: a truncated
    /// export covers `[clock_min, clock_min + export_window]` and
    /// advertises that bound as its clock, so oversized backlogs converge
    /// across rounds.
    #[serde(default = "default_export_window")]
    pub export_window: i64,
    /// Sync jobs executed in parallel across distinct users.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout for a full export request to a peer.
    #[serde(default = "default_export_timeout_secs")]
    pub export_timeout_secs: u64,
    /// Base timeout for a single content fetch attempt against one peer.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// TTL on the per-user sync lock. Must exceed the hard ceiling so the
    /// lock cannot expire under a live executor.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Hard ceiling on how long one job may hold a user lock.
    #[serde(default = "default_lock_hard_ceiling_secs")]
    pub lock_hard_ceiling_secs: u64,
    /// Interval between skipped-CID retry sweeps.
    #[serde(default = "default_skipped_retry_interval_secs")]
    pub skipped_retry_interval_secs: u64,
    /// Skipped files re-attempted per sweep.
    #[serde(default = "default_skipped_retry_batch")]
    pub skipped_retry_batch: u32,
    /// TTL on per-job status records.
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
}

/// Snapback controller tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapbackConfig {
    /// Interval between controller ticks.
    #[serde(default = "default_snapback_interval_ms")]
    pub interval_ms: u64,
    /// Users inspected per tick.
    #[serde(default = "default_snapback_batch_size")]
    pub batch_size: usize,
    /// Timeout on a secondary clock probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Consecutive failed probes before a reconfiguration is proposed.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_max_storage_used_percent() -> u8 {
    95
}

fn default_file_save_max_concurrency() -> usize {
    10
}

fn default_max_failure_count_before_skip() -> u32 {
    3
}

fn default_export_window() -> i64 {
    10_000
}

fn default_max_concurrency() -> usize {
    100
}

fn default_export_timeout_secs() -> u64 {
    300
}

fn default_fetch_timeout_ms() -> u64 {
    1_000
}

fn default_lock_ttl_secs() -> u64 {
    660
}

fn default_lock_hard_ceiling_secs() -> u64 {
    600
}

fn default_skipped_retry_interval_secs() -> u64 {
    600
}

fn default_skipped_retry_batch() -> u32 {
    100
}

fn default_status_ttl_secs() -> u64 {
    86_400
}

fn default_snapback_interval_ms() -> u64 {
    60_000
}

fn default_snapback_batch_size() -> usize {
    100
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_unhealthy_threshold() -> u32 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            file_save_max_concurrency: default_file_save_max_concurrency(),
            max_failure_count_before_skip: default_max_failure_count_before_skip(),
            export_window: default_export_window(),
            max_concurrency: default_max_concurrency(),
            export_timeout_secs: default_export_timeout_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_hard_ceiling_secs: default_lock_hard_ceiling_secs(),
            skipped_retry_interval_secs: default_skipped_retry_interval_secs(),
            skipped_retry_batch: default_skipped_retry_batch(),
            status_ttl_secs: default_status_ttl_secs(),
        }
    }
}

impl Default for SnapbackConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_snapback_interval_ms(),
            batch_size: default_snapback_batch_size(),
            probe_timeout_secs: default_probe_timeout_secs(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

impl SyncConfig {
    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn fetch_base_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_hard_ceiling(&self) -> Duration {
        Duration::from_secs(self.lock_hard_ceiling_secs)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }
}

impl SnapbackConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl AppConfig {
    /// Create a test configuration rooted in `dir`.
    ///
    /// **For testing only.** Dev mode, fast timeouts, ephemeral key.
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            node: NodeConfig {
                creator_node_endpoint: "http://127.0.0.1:0".to_string(),
                delegate_private_key: None,
                dev_mode: true,
                max_storage_used_percent: default_max_storage_used_percent(),
                peer_whitelist: None,
                peer_blacklist: vec![],
            },
            server: ServerConfig::default(),
            storage: StorageConfig::Filesystem {
                path: dir.join("content"),
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("metadata.db"),
            },
            sync: SyncConfig {
                export_timeout_secs: 10,
                fetch_timeout_ms: 500,
                lock_ttl_secs: 30,
                lock_hard_ceiling_secs: 20,
                skipped_retry_interval_secs: 1,
                ..Default::default()
            },
            snapback: SnapbackConfig {
                interval_ms: 50,
                probe_timeout_secs: 2,
                unhealthy_threshold: 5,
                ..Default::default()
            },
        }
    }
}
