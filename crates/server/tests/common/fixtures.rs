//! Seed data helpers.

use super::cluster::TestNode;
use bytes::Bytes;
use chorus_core::{Cid, FileType, WalletKey};
use chorus_metadata::repos::Mutation;

#[allow(dead_code)]
pub fn wallet(s: &str) -> WalletKey {
    WalletKey::parse(s).unwrap()
}

/// Deterministic content for the nth seeded file of a wallet.
#[allow(dead_code)]
pub fn file_bytes(wallet: &WalletKey, n: usize) -> Bytes {
    Bytes::from(format!("audio segment {n} for {wallet}"))
}

/// Write content to a node's storage and return the file mutation for it.
#[allow(dead_code)]
pub async fn seeded_file_mutation(
    node: &TestNode,
    wallet: &WalletKey,
    n: usize,
    file_type: FileType,
    store_bytes: bool,
) -> (Cid, Mutation) {
    let data = file_bytes(wallet, n);
    let cid = Cid::compute(&data);
    let storage_path = if store_bytes {
        node.state
            .storage
            .put_verified(&cid, data.clone())
            .await
            .unwrap()
    } else {
        node.state.storage.path_for(&cid)
    };
    let mutation = Mutation::File {
        multihash: cid.to_hex(),
        storage_path,
        file_type,
        track_blockchain_id: None,
        dir_multihash: None,
        file_name: None,
        size_bytes: Some(data.len() as i64),
        skipped: false,
    };
    (cid, mutation)
}

/// Seed a user on a node with `files` stored file mutations plus enough
/// track/profile mutations to reach `target_clock`. Returns the file CIDs.
///
/// Panics if `target_clock` leaves no room for the non-file mutations.
#[allow(dead_code)]
pub async fn seed_user(
    node: &TestNode,
    wallet: &WalletKey,
    files: usize,
    target_clock: i64,
) -> Vec<Cid> {
    let total = (target_clock + 1) as usize;
    assert!(total >= files, "target clock too small for {files} files");

    let mut cids = vec![];
    let mut mutations = vec![];
    for n in 0..files {
        let file_type = if n % 2 == 0 {
            FileType::Track
        } else {
            FileType::Metadata
        };
        let (cid, mutation) = seeded_file_mutation(node, wallet, n, file_type, true).await;
        cids.push(cid);
        mutations.push(mutation);
    }
    for n in files..total {
        if n % 2 == 0 {
            mutations.push(Mutation::Track {
                track_blockchain_id: n as i64,
                metadata_multihash: Cid::compute(format!("track meta {n}").as_bytes()).to_hex(),
                cover_art_multihash: None,
            });
        } else {
            mutations.push(Mutation::AudiusUser {
                metadata_multihash: Cid::compute(format!("profile {n}").as_bytes()).to_hex(),
                cover_photo: None,
                profile_picture: None,
            });
        }
    }

    let clock = node
        .state
        .metadata
        .append(wallet, &mutations)
        .await
        .unwrap();
    assert_eq!(clock, target_clock);
    cids
}
