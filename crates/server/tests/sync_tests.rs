//! End-to-end sync scenarios across real HTTP between nodes.

mod common;

use chorus_chain::MockChainClient;
use chorus_coord::JobStatus;
use chorus_core::{Cid, FileType};
use chorus_metadata::repos::Mutation;
use chorus_server::snapback::Snapback;
use common::*;
use std::sync::Arc;

async fn two_node_cluster() -> (Arc<MockChainClient>, TestNode, TestNode) {
    let chain = Arc::new(MockChainClient::new());
    let primary = TestNode::spawn(&chain, 1).await;
    let secondary = TestNode::spawn(&chain, 2).await;
    // A registered third member that is not reachable; content fetch falls
    // back past it.
    add_dead_provider(&chain, 3).await;
    (chain, primary, secondary)
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_sync_replicates_full_state() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;

    let cids = seed_user(&primary, &w, 3, 5).await;
    assert_eq!(primary.clock(&w).await, 5);
    assert_eq!(secondary.clock(&w).await, -1);

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");

    assert_eq!(secondary.clock(&w).await, 5);

    // All three files present on disk and verified.
    for cid in &cids {
        assert!(secondary.state.storage.exists(cid).await.unwrap());
        let data = secondary.state.storage.get(cid).await.unwrap();
        assert!(cid.matches(&data));
    }

    // Clock records on the secondary match the primary's.
    let user = secondary.state.metadata.get_user(&w).await.unwrap().unwrap();
    let files = secondary
        .state
        .metadata
        .get_files_for_user(user.user_uuid)
        .await
        .unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| !f.skipped));

    // No failures recorded.
    let history = secondary.state.history.get(&w).unwrap();
    assert_eq!(history.failure_count, 0);
    assert_eq!(history.success_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn incremental_sync_applies_only_new_records() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;

    seed_user(&primary, &w, 2, 3).await;
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    wait_for_job(&secondary, job_id).await;
    assert_eq!(secondary.clock(&w).await, 3);

    // Primary advances to clock 7 with one new file.
    let (_, file_mutation) =
        seeded_file_mutation(&primary, &w, 7, FileType::Copy320, true).await;
    let more = vec![
        file_mutation,
        Mutation::Track {
            track_blockchain_id: 100,
            metadata_multihash: Cid::compute(b"late track").to_hex(),
            cover_art_multihash: None,
        },
        Mutation::AudiusUser {
            metadata_multihash: Cid::compute(b"late profile").to_hex(),
            cover_photo: None,
            profile_picture: None,
        },
        Mutation::Track {
            track_blockchain_id: 101,
            metadata_multihash: Cid::compute(b"later track").to_hex(),
            cover_art_multihash: None,
        },
    ];
    let clock = primary.state.metadata.append(&w, &more).await.unwrap();
    assert_eq!(clock, 7);

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");

    assert_eq!(secondary.clock(&w).await, 7);
    let user = secondary.state.metadata.get_user(&w).await.unwrap().unwrap();
    let slice = secondary
        .state
        .metadata
        .export_slice(&w, 0, 1000)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slice.clock_records.len(), 8);

    // No duplicate file descriptors: 2 from the first sync + 1 new.
    let files = secondary
        .state
        .metadata
        .get_files_for_user(user.user_uuid)
        .await
        .unwrap();
    assert_eq!(files.len(), 3);
    let mut hashes: Vec<&str> = files.iter().map(|f| f.multihash.as_str()).collect();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_contiguous_export_is_rejected() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;

    seed_user(&primary, &w, 2, 3).await;
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    wait_for_job(&secondary, job_id).await;
    assert_eq!(secondary.clock(&w).await, 3);

    // Advance the primary, then punch a hole right where the secondary
    // would resume.
    let more: Vec<Mutation> = (4..=7)
        .map(|n| Mutation::Track {
            track_blockchain_id: n,
            metadata_multihash: Cid::compute(format!("t{n}").as_bytes()).to_hex(),
            cover_art_multihash: None,
        })
        .collect();
    primary.state.metadata.append(&w, &more).await.unwrap();
    sqlx::query("DELETE FROM clock_records WHERE clock = 4")
        .execute(primary.sqlite.pool())
        .await
        .unwrap();

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    match status {
        JobStatus::Failed { error } => assert!(
            error.contains("export_non_contiguous"),
            "unexpected failure: {error}"
        ),
        other => panic!("expected failure, got {other:?}"),
    }

    // Secondary unchanged and its lock released.
    assert_eq!(secondary.clock(&w).await, 3);
    let guard = secondary.state.sync_lock.acquire(&w).await.unwrap();
    assert!(guard.is_some());
    guard.unwrap().release().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_content_failure_skips_after_threshold() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;

    // 10 files, 2 of which the primary never actually stored.
    let mut mutations = vec![];
    let mut missing = vec![];
    for n in 0..10 {
        let store_bytes = n < 8;
        let (cid, mutation) =
            seeded_file_mutation(&primary, &w, n, FileType::Track, store_bytes).await;
        if !store_bytes {
            missing.push(cid);
        }
        mutations.push(mutation);
    }
    primary.state.metadata.append(&w, &mutations).await.unwrap();

    let failure_key = format!("sync_failure:{w}");

    // Attempts one and two fail and bump the counter.
    for expected_count in 1..=2u32 {
        let job_id = secondary.request_sync_from(&primary, &w, false).await;
        let status = wait_for_job(&secondary, job_id).await;
        match status {
            JobStatus::Failed { error } => assert!(
                error.contains("content_fetch_failed"),
                "unexpected failure: {error}"
            ),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(secondary.clock(&w).await, -1);
        assert_eq!(
            secondary.state.coord.get(&failure_key).await.unwrap(),
            Some(expected_count.to_string())
        );
    }

    // Attempt three reaches the threshold: skip the stragglers, commit,
    // reset the counter.
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");

    assert_eq!(secondary.clock(&w).await, 9);
    assert_eq!(secondary.state.coord.get(&failure_key).await.unwrap(), None);

    let user = secondary.state.metadata.get_user(&w).await.unwrap().unwrap();
    let files = secondary
        .state
        .metadata
        .get_files_for_user(user.user_uuid)
        .await
        .unwrap();
    assert_eq!(files.len(), 10);
    let skipped: Vec<&str> = files
        .iter()
        .filter(|f| f.skipped)
        .map(|f| f.multihash.as_str())
        .collect();
    assert_eq!(skipped.len(), 2);
    for cid in &missing {
        assert!(skipped.contains(&cid.to_hex().as_str()));
        assert!(!secondary.state.storage.exists(cid).await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn force_resync_reimports_from_scratch() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;

    seed_user(&primary, &w, 3, 10).await;
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    wait_for_job(&secondary, job_id).await;
    assert_eq!(secondary.clock(&w).await, 10);
    let before = secondary.state.metadata.get_user(&w).await.unwrap().unwrap();

    let job_id = secondary.request_sync_from(&primary, &w, true).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");

    let after = secondary.state.metadata.get_user(&w).await.unwrap().unwrap();
    assert_eq!(after.clock, 10);
    // Truncation mints a fresh local identity for the user.
    assert_ne!(before.user_uuid, after.user_uuid);

    // Idempotent: a second force resync converges to the same state.
    let job_id = secondary.request_sync_from(&primary, &w, true).await;
    wait_for_job(&secondary, job_id).await;
    let again = secondary.state.metadata.get_user(&w).await.unwrap().unwrap();
    assert_eq!(again.clock, 10);
    let slice = secondary
        .state
        .metadata
        .export_slice(&w, 0, 1000)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slice.clock_records.len(), 11);
    assert_eq!(slice.files.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn windowed_export_converges_across_rounds() {
    let chain = Arc::new(MockChainClient::new());
    // The primary serves exports in narrow windows, so a full backlog
    // takes several rounds.
    let primary = TestNode::spawn_with_config(&chain, 1, |config| {
        config.sync.export_window = 3;
    })
    .await;
    let secondary = TestNode::spawn(&chain, 2).await;
    add_dead_provider(&chain, 3).await;

    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;
    let cids = seed_user(&primary, &w, 4, 9).await;

    // One sync advances exactly one window: records [0, 3].
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");
    assert_eq!(secondary.clock(&w).await, 3);

    // Snapback still sees the secondary behind after each partial commit
    // and re-schedules until the backlog is drained.
    let snapback = Snapback::new(primary.state.clone());
    for boundary in [7, 9] {
        let summary = snapback.tick().await.unwrap();
        assert!(summary.syncs_requested >= 1);
        wait_for_clock(&secondary, &w, boundary).await;
    }

    let slice = secondary
        .state
        .metadata
        .export_slice(&w, 0, 1000)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slice.clock_records.len(), 10);
    for cid in &cids {
        assert!(secondary.state.storage.exists(cid).await.unwrap());
    }

    // Converged: the next tick has nothing to schedule.
    let summary = snapback.tick().await.unwrap();
    assert_eq!(summary.syncs_requested, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn export_regression_is_fatal() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;

    seed_user(&primary, &w, 1, 3).await;
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    wait_for_job(&secondary, job_id).await;
    assert_eq!(secondary.clock(&w).await, 3);

    // The primary loses its state and comes back shorter.
    primary.state.metadata.truncate_user(&w).await.unwrap();
    seed_user(&primary, &w, 1, 1).await;

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    match status {
        JobStatus::Failed { error } => assert!(
            error.contains("export_regression"),
            "unexpected failure: {error}"
        ),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(secondary.clock(&w).await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_fails_fast_while_lock_is_held() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;
    seed_user(&primary, &w, 1, 1).await;

    let guard = secondary
        .state
        .sync_lock
        .acquire(&w)
        .await
        .unwrap()
        .unwrap();

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    match status {
        JobStatus::Failed { error } => assert!(
            error.contains("sync_in_progress"),
            "unexpected failure: {error}"
        ),
        other => panic!("expected failure, got {other:?}"),
    }

    guard.release().await.unwrap();

    // With the lock released the same request goes through.
    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");
    assert_eq!(secondary.clock(&w).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn noop_sync_when_already_converged() {
    let (chain, primary, secondary) = two_node_cluster().await;
    let w = wallet("0xaa");
    set_replica_set(&chain, &w, 1, [2, 3]).await;
    seed_user(&primary, &w, 1, 2).await;

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    wait_for_job(&secondary, job_id).await;
    assert_eq!(secondary.clock(&w).await, 2);

    let job_id = secondary.request_sync_from(&primary, &w, false).await;
    let status = wait_for_job(&secondary, job_id).await;
    assert!(matches!(status, JobStatus::Done { .. }), "{status:?}");
    assert_eq!(secondary.clock(&w).await, 2);
}
