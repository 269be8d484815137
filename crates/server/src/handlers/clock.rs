//! Clock probe endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use chorus_core::WalletKey;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ClockStatusResponse {
    pub clock: i64,
}

/// `GET /users/clock_status/{wallet}`: the local clock for a user, `-1`
/// when the user is unknown here.
pub async fn clock_status(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> ApiResult<Json<ClockStatusResponse>> {
    let wallet = WalletKey::parse(&wallet)?;
    let clock = state.metadata.local_clock(&wallet).await?;
    Ok(Json(ClockStatusResponse { clock }))
}
