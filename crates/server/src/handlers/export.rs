//! The `/export` endpoint: serve a contiguous slice of users' state.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use chorus_core::export::{
    AudiusUserWire, ClockRecordWire, ExportData, ExportResponse, ExportedUser, FileType, FileWire,
    IpfsIdObj, TrackWire,
};
use chorus_core::WalletKey;
use chorus_metadata::repos::ExportSlice;
use std::collections::BTreeMap;
use tracing::debug;

/// Parsed `/export` query string. `wallet_public_key` may repeat, which
/// plain struct deserialization cannot express, so the pairs are walked
/// by hand.
struct ExportQuery {
    wallets: Vec<WalletKey>,
    clock_range_min: i64,
    source_endpoint: Option<String>,
}

fn parse_query(pairs: &[(String, String)]) -> ApiResult<ExportQuery> {
    let mut wallets = vec![];
    let mut clock_range_min = 0i64;
    let mut source_endpoint = None;

    for (key, value) in pairs {
        match key.as_str() {
            "wallet_public_key" => wallets.push(WalletKey::parse(value)?),
            "clock_range_min" => {
                clock_range_min = value
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("bad clock_range_min: {value}")))?;
            }
            "source_endpoint" => source_endpoint = Some(value.clone()),
            _ => {}
        }
    }

    if wallets.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one wallet_public_key is required".to_string(),
        ));
    }
    if clock_range_min < 0 {
        return Err(ApiError::BadRequest(
            "clock_range_min must be non-negative".to_string(),
        ));
    }
    Ok(ExportQuery {
        wallets,
        clock_range_min,
        source_endpoint,
    })
}

pub async fn export(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ExportResponse>> {
    let query = parse_query(&pairs)?;

    // Replica-set membership checks need the chain, which needs identity.
    state.sp_id().await.ok_or(ApiError::BootstrapPending)?;

    if let (Some(whitelist), Some(source)) =
        (&state.config.node.peer_whitelist, &query.source_endpoint)
        && !whitelist.contains(source)
    {
        return Err(ApiError::PeerUnauthorized(source.clone()));
    }
    if let Some(source) = &query.source_endpoint
        && state.config.node.peer_blacklist.contains(source)
    {
        return Err(ApiError::PeerUnauthorized(source.clone()));
    }

    // Resolve the caller to an sp id when it identified itself.
    let caller_sp = match &query.source_endpoint {
        Some(source) => match state.chain.sp_id_for_endpoint(source).await? {
            0 => None,
            sp_id => Some(sp_id),
        },
        None => None,
    };

    let window = state.config.sync.export_window;
    let mut cnode_users = BTreeMap::new();

    for wallet in &query.wallets {
        // Unknown users are simply absent from the payload.
        let Some(slice) = state
            .metadata
            .export_slice(wallet, query.clock_range_min, window)
            .await?
        else {
            debug!(wallet = %wallet, "export requested for unknown user");
            continue;
        };

        // A user with an on-chain replica set may only be exported to its
        // members.
        if let Some(replica_set) = state.chain.replica_set_for_user(wallet).await? {
            let authorized = match caller_sp {
                Some(sp_id) => replica_set.contains(sp_id),
                None => state.config.node.dev_mode,
            };
            if !authorized {
                return Err(ApiError::PeerUnauthorized(format!(
                    "{} for user {wallet}",
                    query.source_endpoint.as_deref().unwrap_or("<unidentified>")
                )));
            }
        }

        cnode_users.insert(wallet.clone(), slice_to_wire(slice)?);
    }

    Ok(Json(ExportResponse {
        data: ExportData {
            cnode_users,
            ipfs_id_obj: IpfsIdObj {
                addresses: vec![state.endpoint().to_string()],
            },
        },
    }))
}

fn slice_to_wire(slice: ExportSlice) -> ApiResult<ExportedUser> {
    let wallet = WalletKey::parse(&slice.user.wallet_public_key)?;
    Ok(ExportedUser {
        wallet_public_key: wallet,
        // The covered max, not the user's full clock: a window-truncated
        // export must only claim what its records actually reach, so the
        // receiver commits partial progress and fetches the rest on the
        // next round.
        clock: slice.clock,
        latest_block_number: slice.user.latest_block_number,
        last_login: slice.user.last_login,
        created_at: slice.user.created_at,
        clock_records: slice
            .clock_records
            .into_iter()
            .map(|r| ClockRecordWire {
                clock: r.clock,
                source_table: r.source_table,
                source_row_id: r.source_row_id,
                created_at: r.created_at,
            })
            .collect(),
        files: slice
            .files
            .into_iter()
            .map(|f| {
                Ok(FileWire {
                    clock: f.clock,
                    multihash: f.multihash,
                    file_type: FileType::parse(&f.file_type)?,
                    track_blockchain_id: f.track_blockchain_id,
                    dir_multihash: f.dir_multihash,
                    file_name: f.file_name,
                    size_bytes: f.size_bytes,
                    skipped: f.skipped,
                    created_at: f.created_at,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?,
        tracks: slice
            .tracks
            .into_iter()
            .map(|t| TrackWire {
                track_blockchain_id: t.track_blockchain_id,
                clock: t.clock,
                metadata_multihash: t.metadata_multihash,
                cover_art_multihash: t.cover_art_multihash,
                created_at: t.created_at,
            })
            .collect(),
        audius_users: slice
            .audius_users
            .into_iter()
            .map(|a| AudiusUserWire {
                clock: a.clock,
                metadata_multihash: a.metadata_multihash,
                cover_photo: a.cover_photo,
                profile_picture: a.profile_picture,
                created_at: a.created_at,
            })
            .collect(),
    })
}
