//! Content byte-stream endpoints used by peer fetch and the retry loop.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chorus_core::Cid;

fn bytes_response(data: bytes::Bytes) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response()
}

/// `GET /content/{cid}`: the raw bytes for a CID.
pub async fn get_content(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> ApiResult<Response> {
    let cid = Cid::from_hex(&cid)?;
    let data = state.storage.get(&cid).await?;
    Ok(bytes_response(data))
}

/// `GET /content/{cid}/{file_name}`: a named file inside a directory
/// object, resolved through the file table.
pub async fn get_content_in_dir(
    State(state): State<AppState>,
    Path((dir_cid, file_name)): Path<(String, String)>,
) -> ApiResult<Response> {
    // Validate the directory CID shape before hitting the database.
    Cid::from_hex(&dir_cid)?;

    let file = state
        .metadata
        .get_file_in_dir(&dir_cid, &file_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{file_name} in {dir_cid}")))?;
    if file.skipped {
        return Err(ApiError::NotFound(format!(
            "{file_name} in {dir_cid} is not yet replicated here"
        )));
    }

    let cid = Cid::from_hex(&file.multihash)?;
    let data = state.storage.get(&cid).await?;
    Ok(bytes_response(data))
}
