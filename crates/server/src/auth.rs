//! Peer signature verification for inter-node requests.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::http::HeaderMap;
use chorus_signer::{PublicKey, RequestSigner};
use time::OffsetDateTime;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
}

/// Verify that a request was signed by the delegate key of the service
/// provider it claims to come from. Returns the verified sp id.
///
/// The caller's delegate public key comes from the chain registry, so a
/// node that never registered cannot trigger syncs here.
pub async fn verify_peer_signature(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiResult<u64> {
    let sp_id: u64 = header_value(headers, "x-node-sp-id")?
        .parse()
        .map_err(|_| ApiError::Unauthorized("invalid x-node-sp-id header".to_string()))?;
    let unix_timestamp: i64 = header_value(headers, "x-node-timestamp")?
        .parse()
        .map_err(|_| ApiError::Unauthorized("invalid x-node-timestamp header".to_string()))?;
    let signature = header_value(headers, "x-node-signature")?;

    let provider = state
        .chain
        .service_provider(sp_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("unknown service provider {sp_id}")))?;

    if state.config.node.peer_blacklist.contains(&provider.endpoint) {
        return Err(ApiError::Unauthorized(format!(
            "peer {} is blacklisted",
            provider.endpoint
        )));
    }
    if let Some(whitelist) = &state.config.node.peer_whitelist
        && !whitelist.contains(&provider.endpoint)
    {
        return Err(ApiError::Unauthorized(format!(
            "peer {} is not whitelisted",
            provider.endpoint
        )));
    }

    let public_key = PublicKey::from_hex(&provider.delegate_public_key)
        .map_err(|e| ApiError::Unauthorized(format!("bad delegate key on chain: {e}")))?;
    let timestamp = OffsetDateTime::from_unix_timestamp(unix_timestamp)
        .map_err(|_| ApiError::Unauthorized("invalid timestamp".to_string()))?;

    RequestSigner::verify(
        &public_key,
        sp_id,
        timestamp,
        body,
        signature,
        OffsetDateTime::now_utc(),
    )
    .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    Ok(sp_id)
}
