//! Batched content fetch from a replica set.

use crate::sync::client::PeerClient;
use chorus_core::export::{FileType, FileWire};
use chorus_core::Cid;
use chorus_storage::ContentStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-attempt timeout ceiling, whatever the declared size says.
const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra allowance per declared MiB of content.
const PER_MIB_ALLOWANCE: Duration = Duration::from_millis(500);

/// Result of fetching one batch of files.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// CIDs whose bytes were written and verified, mapped to storage paths.
    pub saved: HashMap<String, String>,
    /// CIDs that could not be fetched from any peer.
    pub failed: Vec<String>,
}

/// Scale the per-attempt timeout with the declared file size, when present.
/// A flat one-second budget starves large audio segments.
pub fn fetch_timeout(base: Duration, size_bytes: Option<i64>) -> Duration {
    match size_bytes {
        Some(size) if size > 0 => {
            let mib = (size as u64).div_ceil(1024 * 1024);
            (base + PER_MIB_ALLOWANCE * mib as u32).min(MAX_FETCH_TIMEOUT)
        }
        _ => base,
    }
}

/// Fetch one file from the first peer that can serve it, verifying the
/// bytes against the descriptor's multihash before writing.
async fn fetch_one(
    client: &PeerClient,
    storage: &Arc<dyn ContentStore>,
    peers: &[String],
    file: &FileWire,
    base_timeout: Duration,
) -> Result<String, ()> {
    let cid = match Cid::from_hex(&file.multihash) {
        Ok(cid) => cid,
        Err(e) => {
            warn!(multihash = %file.multihash, error = %e, "undecodable multihash in export");
            return Err(());
        }
    };

    if storage.exists(&cid).await.unwrap_or(false) {
        return Ok(storage.path_for(&cid));
    }

    let timeout = fetch_timeout(base_timeout, file.size_bytes);
    for peer in peers {
        let fetched = match (&file.file_type, &file.dir_multihash, &file.file_name) {
            // Image variants live inside a directory object and are
            // addressed by directory CID plus name.
            (FileType::Image, Some(dir_cid), Some(name)) => {
                client
                    .fetch_content_in_dir(peer, dir_cid, name, timeout)
                    .await
            }
            _ => client.fetch_content(peer, &file.multihash, timeout).await,
        };

        match fetched {
            Ok(bytes) => match storage.put_verified(&cid, bytes).await {
                Ok(path) => {
                    debug!(cid = %cid, peer = %peer, "content fetched");
                    return Ok(path);
                }
                Err(e) => {
                    warn!(cid = %cid, peer = %peer, error = %e, "peer served bad content");
                }
            },
            Err(e) => {
                debug!(cid = %cid, peer = %peer, error = %e, "content fetch attempt failed");
            }
        }
    }
    Err(())
}

/// Fetch a set of files in bounded-concurrency slices.
///
/// Directory descriptors carry no payload and must be filtered out by the
/// caller; everything passed here is expected to have fetchable bytes.
pub async fn fetch_files(
    client: &PeerClient,
    storage: &Arc<dyn ContentStore>,
    peers: &[String],
    files: &[&FileWire],
    concurrency: usize,
    base_timeout: Duration,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    for slice in files.chunks(concurrency.max(1)) {
        let attempts = slice
            .iter()
            .map(|file| async move {
                let result = fetch_one(client, storage, peers, file, base_timeout).await;
                (file.multihash.clone(), result)
            })
            .collect::<Vec<_>>();

        for (multihash, result) in futures::future::join_all(attempts).await {
            match result {
                Ok(path) => {
                    outcome.saved.insert(multihash, path);
                }
                Err(()) => outcome.failed.push(multihash),
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_timeout_unscaled_without_size() {
        let base = Duration::from_secs(1);
        assert_eq!(fetch_timeout(base, None), base);
        assert_eq!(fetch_timeout(base, Some(0)), base);
    }

    #[test]
    fn fetch_timeout_scales_with_size() {
        let base = Duration::from_secs(1);
        // 4 MiB declared -> base + 4 * 500ms
        assert_eq!(
            fetch_timeout(base, Some(4 * 1024 * 1024)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn fetch_timeout_is_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(
            fetch_timeout(base, Some(10 * 1024 * 1024 * 1024)),
            MAX_FETCH_TIMEOUT
        );
    }
}
