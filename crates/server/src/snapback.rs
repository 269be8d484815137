//! The Snapback controller: periodically re-converges secondaries to this
//! primary and heals replica sets around unreachable peers.

use crate::state::AppState;
use crate::sync::SyncJobParams;
use chorus_chain::{ReplicaSet, ServiceProvider};
use chorus_core::WalletKey;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Unhealthy counters older than this are forgotten.
const UNHEALTHY_COUNT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn unhealthy_key(wallet: &WalletKey, sp_id: u64) -> String {
    format!("unhealthy:{wallet}:{sp_id}")
}

/// Errors that abort a whole controller tick.
#[derive(Debug, Error)]
pub enum SnapbackError {
    #[error("chain error: {0}")]
    Chain(#[from] chorus_chain::ChainError),

    #[error("metadata error: {0}")]
    Metadata(#[from] chorus_metadata::MetadataError),

    #[error("coordination error: {0}")]
    Coord(#[from] chorus_coord::CoordError),
}

/// What one controller tick did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Secondary probes attempted.
    pub probed: usize,
    /// Sync requests issued to lagging secondaries.
    pub syncs_requested: usize,
    /// Replica-set reconfigurations proposed.
    pub reconfigurations: usize,
    /// True when the tick was a no-op because identity is not ready.
    pub skipped_bootstrapping: bool,
}

impl TickSummary {
    fn merge(&mut self, other: TickSummary) {
        self.probed += other.probed;
        self.syncs_requested += other.syncs_requested;
        self.reconfigurations += other.reconfigurations;
    }
}

/// The recurring controller. One instance per node; ticks walk a rotating
/// bounded batch of the users this node is primary for.
pub struct Snapback {
    state: AppState,
    cursor: AtomicUsize,
}

impl Snapback {
    pub fn new(state: AppState) -> Arc<Self> {
        Arc::new(Self {
            state,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Spawn the recurring controller loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.state.config.snapback.interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match self.tick().await {
                    Ok(summary) => {
                        if summary.probed > 0 {
                            debug!(
                                probed = summary.probed,
                                syncs = summary.syncs_requested,
                                reconfigurations = summary.reconfigurations,
                                "snapback tick complete"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "snapback tick failed"),
                }
            }
        })
    }

    /// Run one controller pass over a bounded batch of users.
    pub async fn tick(&self) -> Result<TickSummary, SnapbackError> {
        let Some(sp_id) = self.state.sp_id().await else {
            return Ok(TickSummary {
                skipped_bootstrapping: true,
                ..Default::default()
            });
        };

        let wallets = self.state.chain.users_with_primary(sp_id).await?;
        if wallets.is_empty() {
            return Ok(TickSummary::default());
        }

        // Rotate through the user list so a large population is smoothed
        // across ticks rather than hammered in one.
        let batch_size = self.state.config.snapback.batch_size.max(1);
        let start = self.cursor.fetch_add(batch_size, Ordering::Relaxed) % wallets.len();
        let batch: Vec<&WalletKey> = wallets
            .iter()
            .cycle()
            .skip(start)
            .take(batch_size.min(wallets.len()))
            .collect();

        let mut summary = TickSummary::default();
        for wallet in batch {
            match self.check_user(wallet, sp_id).await {
                Ok(user_summary) => summary.merge(user_summary),
                Err(e) => warn!(wallet = %wallet, error = %e, "snapback user check failed"),
            }
        }
        Ok(summary)
    }

    /// Probe both secondaries of one user and act on divergence.
    async fn check_user(
        &self,
        wallet: &WalletKey,
        sp_id: u64,
    ) -> Result<TickSummary, SnapbackError> {
        let mut summary = TickSummary::default();

        let Some(replica_set) = self.state.chain.replica_set_for_user(wallet).await? else {
            return Ok(summary);
        };
        // The set may have been reconfigured away from us since listing.
        if replica_set.primary != sp_id {
            return Ok(summary);
        }

        let primary_clock = self.state.metadata.local_clock(wallet).await?;

        for secondary in replica_set.secondaries {
            summary.probed += 1;

            let endpoint = match self.state.chain.service_provider(secondary).await? {
                Some(sp) => sp.endpoint,
                None => {
                    // Registered in the replica set but gone from the
                    // provider registry: treat as unreachable.
                    self.handle_unreachable(wallet, &replica_set, secondary, &mut summary)
                        .await?;
                    continue;
                }
            };

            match self.state.peers.fetch_clock(&endpoint, wallet).await {
                Ok(clock) if clock == primary_clock => {
                    self.reset_unhealthy(wallet, secondary).await?;
                }
                Ok(clock) if clock < primary_clock => {
                    self.reset_unhealthy(wallet, secondary).await?;
                    let params = SyncJobParams {
                        wallet: vec![wallet.clone()],
                        creator_node_endpoint: self.state.endpoint().to_string(),
                        block_number: None,
                        force_resync: false,
                    };
                    match self
                        .state
                        .peers
                        .request_sync(&endpoint, &self.state.signer, sp_id, &params)
                        .await
                    {
                        Ok(job_id) => {
                            debug!(
                                wallet = %wallet,
                                secondary,
                                secondary_clock = clock,
                                primary_clock,
                                job_id = %job_id,
                                "sync requested for lagging secondary"
                            );
                            summary.syncs_requested += 1;
                        }
                        Err(e) => {
                            warn!(wallet = %wallet, secondary, error = %e, "failed to request sync")
                        }
                    }
                }
                Ok(clock) => {
                    // A secondary ahead of its primary means this node lost
                    // writes; that needs an operator, not a sync.
                    warn!(
                        wallet = %wallet,
                        secondary,
                        secondary_clock = clock,
                        primary_clock,
                        "secondary is ahead of primary"
                    );
                    self.reset_unhealthy(wallet, secondary).await?;
                }
                Err(e) => {
                    debug!(wallet = %wallet, secondary, error = %e, "secondary probe failed");
                    self.handle_unreachable(wallet, &replica_set, secondary, &mut summary)
                        .await?;
                }
            }
        }

        Ok(summary)
    }

    async fn handle_unreachable(
        &self,
        wallet: &WalletKey,
        replica_set: &ReplicaSet,
        secondary: u64,
        summary: &mut TickSummary,
    ) -> Result<(), SnapbackError> {
        let count = self.bump_unhealthy(wallet, secondary).await?;
        let threshold = self.state.config.snapback.unhealthy_threshold;
        if count < threshold {
            return Ok(());
        }

        match self.pick_replacement(wallet, replica_set).await? {
            Some(replacement) => {
                info!(
                    wallet = %wallet,
                    unhealthy = secondary,
                    replacement = replacement.sp_id,
                    consecutive_failures = count,
                    "proposing replica-set reconfiguration"
                );
                self.state
                    .chain
                    .propose_reconfiguration(wallet, secondary, replacement.sp_id)
                    .await?;
                self.reset_unhealthy(wallet, secondary).await?;
                summary.reconfigurations += 1;
            }
            None => {
                warn!(
                    wallet = %wallet,
                    unhealthy = secondary,
                    "no healthy replacement candidate available"
                );
            }
        }
        Ok(())
    }

    /// Pick a random registered provider outside the current replica set
    /// that answers a clock probe.
    async fn pick_replacement(
        &self,
        wallet: &WalletKey,
        replica_set: &ReplicaSet,
    ) -> Result<Option<ServiceProvider>, SnapbackError> {
        let mut candidates: Vec<ServiceProvider> = self
            .state
            .chain
            .list_service_providers()
            .await?
            .into_iter()
            .filter(|sp| !replica_set.contains(sp.sp_id))
            .filter(|sp| !self.state.config.node.peer_blacklist.contains(&sp.endpoint))
            .collect();
        candidates.shuffle(&mut rand::thread_rng());

        for candidate in candidates {
            if self
                .state
                .peers
                .fetch_clock(&candidate.endpoint, wallet)
                .await
                .is_ok()
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn bump_unhealthy(
        &self,
        wallet: &WalletKey,
        sp_id: u64,
    ) -> Result<u32, SnapbackError> {
        let key = unhealthy_key(wallet, sp_id);
        let current: u32 = match self.state.coord.get(&key).await? {
            Some(raw) => raw.parse().unwrap_or(0),
            None => 0,
        };
        let next = current + 1;
        self.state
            .coord
            .set(&key, &next.to_string(), Some(UNHEALTHY_COUNT_TTL))
            .await?;
        Ok(next)
    }

    async fn reset_unhealthy(&self, wallet: &WalletKey, sp_id: u64) -> Result<(), SnapbackError> {
        self.state.coord.del(&unhealthy_key(wallet, sp_id)).await?;
        Ok(())
    }
}
