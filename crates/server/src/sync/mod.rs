//! The sync execution pipeline.
//!
//! A sync job makes one secondary converge to a peer's state for a set of
//! users: lock, baseline, export, contiguity check, content fetch, atomic
//! commit. Jobs arrive through the async job queue; Snapback on the primary
//! is the usual enqueuer.

pub mod client;
pub mod executor;
pub mod fetch;
pub mod history;

use chorus_core::WalletKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Task name sync jobs are queued under.
pub const SYNC_TASK: &str = "sync";

/// Parameters of one sync job. Field names double as the `POST /sync` wire
/// format, so a queued job is exactly what the peer sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobParams {
    /// Users to sync.
    pub wallet: Vec<WalletKey>,
    /// Peer endpoint to pull the export from.
    pub creator_node_endpoint: String,
    /// Chain height that triggered the sync, when known.
    #[serde(default)]
    pub block_number: Option<i64>,
    /// Truncate local state and re-import from scratch.
    #[serde(default)]
    pub force_resync: bool,
}

/// Job-level sync failures. Each kind maps to a stable string surfaced in
/// job status records and logs.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync already in progress for {0}")]
    SyncInProgress(WalletKey),

    #[error("invalid export from {endpoint}: {reason}")]
    ExportInvalid { endpoint: String, reason: String },

    #[error("export regression for {wallet}: peer clock {fetched} below local {local}")]
    ExportRegression {
        wallet: WalletKey,
        fetched: i64,
        local: i64,
    },

    #[error("non-contiguous export for {wallet}: first fetched clock {first}, local clock {local}")]
    ExportNonContiguous {
        wallet: WalletKey,
        first: i64,
        local: i64,
    },

    #[error(
        "content fetch failed for {wallet}: {failed} of {total} cids (attempt {attempt} of {threshold})"
    )]
    ContentFetchFailed {
        wallet: WalletKey,
        failed: usize,
        total: usize,
        attempt: u32,
        threshold: u32,
    },

    #[error("commit failed for {wallet}: {source}")]
    CommitFailed {
        wallet: WalletKey,
        #[source]
        source: chorus_metadata::MetadataError,
    },

    #[error("lock held past hard ceiling for {0}")]
    LockCeilingExceeded(WalletKey),

    #[error("node identity not yet bootstrapped")]
    BootstrapPending,

    #[error("coordination error: {0}")]
    Coord(#[from] chorus_coord::CoordError),

    #[error("metadata error: {0}")]
    Metadata(#[from] chorus_metadata::MetadataError),

    #[error("chain error: {0}")]
    Chain(#[from] chorus_chain::ChainError),
}

impl SyncError {
    /// Stable kind string for status records and the history aggregator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncInProgress(_) => "sync_in_progress",
            Self::ExportInvalid { .. } => "export_invalid",
            Self::ExportRegression { .. } => "export_regression",
            Self::ExportNonContiguous { .. } => "export_non_contiguous",
            Self::ContentFetchFailed { .. } => "content_fetch_failed",
            Self::CommitFailed { .. } => "commit_failed",
            Self::LockCeilingExceeded(_) => "lock_ceiling_exceeded",
            Self::BootstrapPending => "bootstrap_pending",
            Self::Coord(_) => "coordination_error",
            Self::Metadata(_) => "metadata_error",
            Self::Chain(_) => "chain_error",
        }
    }
}
