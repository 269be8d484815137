//! Sync trigger and job status endpoints.

use crate::auth::verify_peer_signature;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::sync::{SYNC_TASK, SyncJobParams};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use chorus_coord::JobStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct SyncTriggerResponse {
    pub job_id: Uuid,
}

/// `POST /sync`: enqueue a sync job. The body is [`SyncJobParams`] and must
/// carry a valid peer signature.
pub async fn trigger_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SyncTriggerResponse>)> {
    // Sync needs replica-set lookups, which need identity.
    state.sp_id().await.ok_or(ApiError::BootstrapPending)?;

    let requester_sp = verify_peer_signature(&state, &headers, &body).await?;

    let params: SyncJobParams = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid sync request: {e}")))?;
    if params.wallet.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one wallet is required".to_string(),
        ));
    }

    let job_id = state
        .queue
        .enqueue(SYNC_TASK, serde_json::to_value(&params).map_err(|e| {
            ApiError::Internal(format!("failed to serialize sync params: {e}"))
        })?)
        .await?;

    info!(
        job_id = %job_id,
        requester_sp,
        source = %params.creator_node_endpoint,
        users = params.wallet.len(),
        force_resync = params.force_resync,
        "sync job enqueued"
    );
    Ok((StatusCode::ACCEPTED, Json(SyncTriggerResponse { job_id })))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub uuid: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp: Option<Value>,
}

/// `GET /async_processing_status?uuid=…`: terminal or in-flight status of
/// a queued job.
pub async fn processing_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state
        .queue
        .status(SYNC_TASK, &query.uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no status for request {}", query.uuid)))?;

    let response = match status {
        JobStatus::InProgress => StatusResponse {
            status: "IN_PROGRESS",
            resp: None,
        },
        JobStatus::Done { resp } => StatusResponse {
            status: "DONE",
            resp: Some(resp),
        },
        JobStatus::Failed { error } => StatusResponse {
            status: "FAILED",
            resp: Some(Value::String(error)),
        },
    };
    Ok(Json(response))
}
