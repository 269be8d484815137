//! Background retry loop for files recorded as skipped during sync.

use crate::state::AppState;
use crate::sync::fetch::fetch_timeout;
use chorus_core::{Cid, WalletKey};
use chorus_metadata::models::FileRow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What one sweep over skipped files did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub attempted: usize,
    pub recovered: usize,
}

/// Spawn the recurring sweep.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.sync.skipped_retry_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match sweep(&state).await {
                Ok(summary) if summary.attempted > 0 => {
                    info!(
                        attempted = summary.attempted,
                        recovered = summary.recovered,
                        "skipped-file sweep complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "skipped-file sweep failed"),
            }
        }
    })
}

/// Re-attempt a bounded batch of skipped files against each user's current
/// replica set.
pub async fn sweep(state: &AppState) -> Result<SweepSummary, chorus_metadata::MetadataError> {
    let batch = state
        .metadata
        .get_skipped_files(state.config.sync.skipped_retry_batch)
        .await?;

    let mut summary = SweepSummary::default();
    for file in batch {
        summary.attempted += 1;
        if retry_file(state, &file).await {
            summary.recovered += 1;
        }
    }
    Ok(summary)
}

/// Try to recover one skipped file. The `skipped` flag only clears after
/// the fetched bytes verify against the row's multihash.
async fn retry_file(state: &AppState, file: &FileRow) -> bool {
    let user = match state.metadata.get_user_by_uuid(file.user_uuid).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!(file_uuid = %file.file_uuid, "skipped file has no user, leaving for cleanup");
            return false;
        }
        Err(e) => {
            warn!(file_uuid = %file.file_uuid, error = %e, "user lookup failed");
            return false;
        }
    };
    let wallet = match WalletKey::parse(&user.wallet_public_key) {
        Ok(wallet) => wallet,
        Err(e) => {
            warn!(file_uuid = %file.file_uuid, error = %e, "stored wallet key is invalid");
            return false;
        }
    };
    let cid = match Cid::from_hex(&file.multihash) {
        Ok(cid) => cid,
        Err(e) => {
            warn!(file_uuid = %file.file_uuid, error = %e, "stored multihash is invalid");
            return false;
        }
    };

    // Re-resolve the replica set at attempt time; membership may have
    // changed since the file was recorded.
    let peers = match state.chain.replica_set_for_user(&wallet).await {
        Ok(Some(replica_set)) => {
            let mut peers = vec![];
            for sp_id in replica_set.members() {
                match state.chain.service_provider(sp_id).await {
                    Ok(Some(sp)) if sp.endpoint != state.endpoint() => peers.push(sp.endpoint),
                    Ok(_) => {}
                    Err(e) => warn!(sp_id, error = %e, "service provider lookup failed"),
                }
            }
            peers
        }
        Ok(None) => vec![],
        Err(e) => {
            warn!(wallet = %wallet, error = %e, "replica set lookup failed");
            return false;
        }
    };
    if peers.is_empty() {
        return false;
    }

    let timeout = fetch_timeout(state.config.sync.fetch_base_timeout(), file.size_bytes);
    for peer in &peers {
        let fetched = match (&file.dir_multihash, &file.file_name) {
            (Some(dir_cid), Some(name)) if file.file_type == "image" => {
                state
                    .peers
                    .fetch_content_in_dir(peer, dir_cid, name, timeout)
                    .await
            }
            _ => state.peers.fetch_content(peer, &file.multihash, timeout).await,
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(cid = %cid, peer = %peer, error = %e, "skipped-file fetch attempt failed");
                continue;
            }
        };

        match state.storage.put_verified(&cid, bytes).await {
            Ok(_) => match state.metadata.clear_skipped(file.file_uuid).await {
                Ok(()) => {
                    debug!(cid = %cid, peer = %peer, "skipped file recovered");
                    return true;
                }
                Err(e) => {
                    warn!(file_uuid = %file.file_uuid, error = %e, "failed to clear skipped flag");
                    return false;
                }
            },
            Err(e) => {
                warn!(cid = %cid, peer = %peer, error = %e, "peer served bad content for skipped file");
            }
        }
    }
    false
}
