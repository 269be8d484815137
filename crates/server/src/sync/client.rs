//! HTTP client for peer creator nodes.

use crate::sync::{SyncError, SyncJobParams};
use bytes::Bytes;
use chorus_core::config::{SnapbackConfig, SyncConfig};
use chorus_core::{ExportData, ExportResponse, WalletKey};
use chorus_signer::RequestSigner;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Peer request errors below the sync-error level.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("undecodable response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ClockStatusResponse {
    clock: i64,
}

#[derive(Debug, Deserialize)]
struct SyncTriggerResponse {
    job_id: Uuid,
}

/// Typed HTTP client for the inter-node surface, with per-call timeouts.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    export_timeout: Duration,
    probe_timeout: Duration,
}

impl PeerClient {
    pub fn new(sync: &SyncConfig, snapback: &SnapbackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            export_timeout: sync.export_timeout(),
            probe_timeout: snapback.probe_timeout(),
        }
    }

    /// Fetch an export slice from a peer. Any transport, status, or schema
    /// failure is an [`SyncError::ExportInvalid`].
    pub async fn fetch_export(
        &self,
        endpoint: &str,
        wallets: &[&WalletKey],
        clock_range_min: i64,
        source_endpoint: &str,
    ) -> Result<ExportData, SyncError> {
        let invalid = |reason: String| SyncError::ExportInvalid {
            endpoint: endpoint.to_string(),
            reason,
        };

        let mut query: Vec<(&str, String)> = wallets
            .iter()
            .map(|w| ("wallet_public_key", w.to_string()))
            .collect();
        query.push(("clock_range_min", clock_range_min.to_string()));
        query.push(("source_endpoint", source_endpoint.to_string()));

        let response = self
            .http
            .get(format!("{endpoint}/export"))
            .query(&query)
            .timeout(self.export_timeout)
            .send()
            .await
            .map_err(|e| invalid(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| invalid(e.to_string()))?;
        if !status.is_success() {
            return Err(invalid(format!("status {status}: {body}")));
        }

        let parsed: ExportResponse =
            serde_json::from_str(&body).map_err(|e| invalid(format!("bad schema: {e}")))?;
        Ok(parsed.data)
    }

    /// Probe a peer's clock for one user.
    pub async fn fetch_clock(&self, endpoint: &str, wallet: &WalletKey) -> Result<i64, PeerError> {
        let response = self
            .http
            .get(format!("{endpoint}/users/clock_status/{wallet}"))
            .timeout(self.probe_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PeerError::Status { status, body });
        }
        let parsed: ClockStatusResponse = response
            .json()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))?;
        Ok(parsed.clock)
    }

    /// Fetch content bytes by CID from a peer.
    pub async fn fetch_content(
        &self,
        endpoint: &str,
        cid: &str,
        timeout: Duration,
    ) -> Result<Bytes, PeerError> {
        let response = self
            .http
            .get(format!("{endpoint}/content/{cid}"))
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PeerError::Status { status, body });
        }
        Ok(response.bytes().await?)
    }

    /// Fetch a named file inside a directory object from a peer. Image
    /// variants resized into a directory are addressed this way.
    pub async fn fetch_content_in_dir(
        &self,
        endpoint: &str,
        dir_cid: &str,
        file_name: &str,
        timeout: Duration,
    ) -> Result<Bytes, PeerError> {
        let response = self
            .http
            .get(format!("{endpoint}/content/{dir_cid}/{file_name}"))
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PeerError::Status { status, body });
        }
        Ok(response.bytes().await?)
    }

    /// Trigger a sync on a peer (typically a secondary), signed with this
    /// node's delegate key.
    pub async fn request_sync(
        &self,
        endpoint: &str,
        signer: &RequestSigner,
        sp_id: u64,
        params: &SyncJobParams,
    ) -> Result<Uuid, PeerError> {
        let body =
            serde_json::to_vec(params).map_err(|e| PeerError::Decode(e.to_string()))?;
        let timestamp = OffsetDateTime::now_utc();
        let signature = signer.sign(sp_id, timestamp, &body);

        let response = self
            .http
            .post(format!("{endpoint}/sync"))
            .header("content-type", "application/json")
            .header("x-node-sp-id", sp_id.to_string())
            .header("x-node-timestamp", timestamp.unix_timestamp().to_string())
            .header("x-node-signature", signature)
            .body(body)
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PeerError::Status { status, body });
        }
        let parsed: SyncTriggerResponse = response
            .json()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))?;
        Ok(parsed.job_id)
    }
}
