//! The sync executor: makes this node converge to a peer's state for a user.

use crate::state::AppState;
use crate::sync::fetch::{self, FetchOutcome};
use crate::sync::{SyncError, SyncJobParams};
use chorus_coord::{Job, JobResult};
use chorus_core::export::{FileType, FileWire};
use chorus_core::{Cid, WalletKey};
use chorus_metadata::repos::{IncomingFile, SyncCommit};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

/// Coordination key of the per-user content-fetch failure counter.
fn failure_key(wallet: &WalletKey) -> String {
    format!("sync_failure:{wallet}")
}

/// Counter entries older than this are stale and may expire.
const FAILURE_COUNT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What one successful per-user sync did.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub new_clock: i64,
    pub records_applied: usize,
    pub files_saved: usize,
    pub files_skipped: usize,
}

/// Queue handler for sync jobs: syncs each wallet in turn and reports the
/// per-wallet outcome.
pub async fn handle_sync_job(state: AppState, job: Job) -> JobResult {
    let params: SyncJobParams =
        serde_json::from_value(job.params).map_err(|e| format!("invalid sync params: {e}"))?;

    let mut per_wallet = serde_json::Map::new();
    let mut failures: Vec<String> = vec![];

    for wallet in &params.wallet {
        match sync_user(&state, wallet, &params).await {
            Ok(report) => {
                info!(
                    wallet = %wallet,
                    source = %params.creator_node_endpoint,
                    new_clock = report.new_clock,
                    files_saved = report.files_saved,
                    files_skipped = report.files_skipped,
                    "sync complete"
                );
                state.history.record_success(wallet);
                per_wallet.insert(
                    wallet.to_string(),
                    serde_json::to_value(&report).map_err(|e| e.to_string())?,
                );
            }
            Err(e) => {
                warn!(
                    wallet = %wallet,
                    source = %params.creator_node_endpoint,
                    kind = e.kind(),
                    error = %e,
                    "sync failed"
                );
                state.history.record_failure(wallet, e.kind());
                failures.push(format!("{wallet}: [{}] {e}", e.kind()));
            }
        }
    }

    if failures.is_empty() {
        Ok(json!({ "users": per_wallet }))
    } else {
        Err(failures.join("; "))
    }
}

/// Sync one user under its exclusive lock.
///
/// The lock is released on every exit path; the hard ceiling bounds how
/// long the critical section may run before the job is failed outright.
pub async fn sync_user(
    state: &AppState,
    wallet: &WalletKey,
    params: &SyncJobParams,
) -> Result<SyncReport, SyncError> {
    let guard = state
        .sync_lock
        .acquire(wallet)
        .await?
        .ok_or_else(|| SyncError::SyncInProgress(wallet.clone()))?;

    let ceiling = state.config.sync.lock_hard_ceiling();
    let result = match tokio::time::timeout(ceiling, sync_user_locked(state, wallet, params)).await
    {
        Ok(result) => result,
        Err(_) => Err(SyncError::LockCeilingExceeded(wallet.clone())),
    };

    if let Err(e) = guard.release().await {
        warn!(wallet = %wallet, error = %e, "failed to release sync lock");
    }
    result
}

async fn sync_user_locked(
    state: &AppState,
    wallet: &WalletKey,
    params: &SyncJobParams,
) -> Result<SyncReport, SyncError> {
    // Clock baseline. Force resync starts the user over from nothing.
    if params.force_resync {
        state.metadata.truncate_user(wallet).await?;
        info!(wallet = %wallet, "force resync: local state truncated");
    }
    let local_clock = state.metadata.local_clock(wallet).await?;

    // Export fetch.
    let export = state
        .peers
        .fetch_export(
            &params.creator_node_endpoint,
            &[wallet],
            local_clock + 1,
            state.endpoint(),
        )
        .await?;
    let fetched =
        export
            .cnode_users
            .get(wallet)
            .ok_or_else(|| SyncError::ExportInvalid {
                endpoint: params.creator_node_endpoint.clone(),
                reason: format!("user {wallet} missing from export"),
            })?;

    // Contiguity check.
    if fetched.clock < local_clock {
        return Err(SyncError::ExportRegression {
            wallet: wallet.clone(),
            fetched: fetched.clock,
            local: local_clock,
        });
    }
    if fetched.clock == local_clock {
        return Ok(SyncReport {
            new_clock: local_clock,
            ..Default::default()
        });
    }
    let first = fetched
        .clock_records
        .first()
        .ok_or_else(|| SyncError::ExportInvalid {
            endpoint: params.creator_node_endpoint.clone(),
            reason: format!(
                "peer advertises clock {} but sent no clock records",
                fetched.clock
            ),
        })?;
    if first.clock != local_clock + 1 {
        if local_clock >= 0 {
            return Err(SyncError::ExportNonContiguous {
                wallet: wallet.clone(),
                first: first.clock,
                local: local_clock,
            });
        }
        return Err(SyncError::ExportInvalid {
            endpoint: params.creator_node_endpoint.clone(),
            reason: format!("fresh export starts at clock {} instead of 0", first.clock),
        });
    }
    fetched
        .validate(local_clock + 1)
        .map_err(|e| SyncError::ExportInvalid {
            endpoint: params.creator_node_endpoint.clone(),
            reason: e.to_string(),
        })?;

    // Fallback content sources: the source peer first, then the rest of
    // the user's current replica set.
    let peers = content_peers(state, wallet, &params.creator_node_endpoint).await?;

    // Batched content fetch. Directory descriptors are structural and
    // exporter-skipped files stay skipped; neither is fetched.
    let fetchable: Vec<&FileWire> = fetched
        .files
        .iter()
        .filter(|f| f.file_type != FileType::Dir && !f.skipped)
        .collect();
    let (track_files, non_track_files): (Vec<&FileWire>, Vec<&FileWire>) = fetchable
        .iter()
        .copied()
        .partition(|f| f.file_type.is_track_content());

    let concurrency = state.config.sync.file_save_max_concurrency;
    let base_timeout = state.config.sync.fetch_base_timeout();
    let mut outcome = fetch::fetch_files(
        &state.peers,
        &state.storage,
        &peers,
        &non_track_files,
        concurrency,
        base_timeout,
    )
    .await;
    let track_outcome = fetch::fetch_files(
        &state.peers,
        &state.storage,
        &peers,
        &track_files,
        concurrency,
        base_timeout,
    )
    .await;
    merge_outcomes(&mut outcome, track_outcome);

    // Failure gating: below the threshold the job fails and will be
    // retried wholesale; at the threshold the failed CIDs are recorded as
    // skipped placeholders and the sync proceeds.
    let threshold = state.config.sync.max_failure_count_before_skip;
    let mut newly_skipped: HashSet<String> = HashSet::new();
    if outcome.failed.is_empty() {
        reset_failure_count(state, wallet).await?;
    } else {
        let attempt = bump_failure_count(state, wallet).await?;
        if attempt < threshold {
            return Err(SyncError::ContentFetchFailed {
                wallet: wallet.clone(),
                failed: outcome.failed.len(),
                total: fetchable.len(),
                attempt,
                threshold,
            });
        }
        warn!(
            wallet = %wallet,
            failed = outcome.failed.len(),
            attempt,
            "failure threshold reached, recording unfetched cids as skipped"
        );
        newly_skipped.extend(outcome.failed.iter().cloned());
        reset_failure_count(state, wallet).await?;
    }

    // Atomic commit.
    let files: Vec<IncomingFile> = fetched
        .files
        .iter()
        .map(|wire| IncomingFile {
            wire: wire.clone(),
            storage_path: Cid::from_hex(&wire.multihash)
                .map(|cid| state.storage.path_for(&cid))
                .unwrap_or_default(),
            skipped: wire.skipped || newly_skipped.contains(&wire.multihash),
        })
        .collect();
    let files_skipped = files.iter().filter(|f| f.skipped).count();

    let commit = SyncCommit {
        wallet: wallet.clone(),
        clock: fetched.clock,
        latest_block_number: fetched.latest_block_number,
        last_login: fetched.last_login,
        created_at: fetched.created_at,
        clock_records: fetched.clock_records.clone(),
        files,
        tracks: fetched.tracks.clone(),
        audius_users: fetched.audius_users.clone(),
    };
    state
        .metadata
        .commit_sync(&commit)
        .await
        .map_err(|source| SyncError::CommitFailed {
            wallet: wallet.clone(),
            source,
        })?;

    Ok(SyncReport {
        new_clock: fetched.clock,
        records_applied: fetched.clock_records.len(),
        files_saved: outcome.saved.len(),
        files_skipped,
    })
}

/// The ordered list of endpoints content may be fetched from: the export
/// source first, then the other members of the user's replica set, minus
/// self, deduped, minus blacklisted peers.
async fn content_peers(
    state: &AppState,
    wallet: &WalletKey,
    source_endpoint: &str,
) -> Result<Vec<String>, SyncError> {
    let mut peers: Vec<String> = vec![source_endpoint.to_string()];

    if let Some(replica_set) = state.chain.replica_set_for_user(wallet).await? {
        for sp_id in replica_set.members() {
            if let Some(sp) = state.chain.service_provider(sp_id).await?
                && sp.endpoint != state.endpoint()
                && !peers.contains(&sp.endpoint)
            {
                peers.push(sp.endpoint);
            }
        }
    }

    peers.retain(|peer| !state.config.node.peer_blacklist.contains(peer));
    Ok(peers)
}

fn merge_outcomes(into: &mut FetchOutcome, from: FetchOutcome) {
    into.saved.extend(from.saved);
    into.failed.extend(from.failed);
}

async fn bump_failure_count(state: &AppState, wallet: &WalletKey) -> Result<u32, SyncError> {
    let key = failure_key(wallet);
    let current: u32 = match state.coord.get(&key).await? {
        Some(raw) => raw.parse().unwrap_or(0),
        None => 0,
    };
    let next = current + 1;
    state
        .coord
        .set(&key, &next.to_string(), Some(FAILURE_COUNT_TTL))
        .await?;
    Ok(next)
}

async fn reset_failure_count(state: &AppState, wallet: &WalletKey) -> Result<(), SyncError> {
    state.coord.del(&failure_key(wallet)).await?;
    Ok(())
}
