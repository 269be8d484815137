//! Identity bootstrap: bind this node instance to its on-chain
//! service-provider identity.

use crate::state::AppState;
use chorus_chain::ChainError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Fixed backoff while waiting for the endpoint to resolve to an sp id.
const SP_ID_RETRY: Duration = Duration::from_secs(5);

/// Backoff between registration attempts.
const REGISTER_RETRY: Duration = Duration::from_secs(10);

/// Long-poll interval for registry deployment.
fn registry_poll_interval(dev_mode: bool) -> Duration {
    if dev_mode {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(600)
    }
}

/// Spawn the bootstrap loop. An unrecoverable chain failure is fatal for
/// the whole process.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run(&state).await {
            error!(error = %e, "unrecoverable chain failure during identity bootstrap");
            std::process::exit(1);
        }
    })
}

/// Resolve, wait for the registry, register, and mark the node ready.
///
/// Transient chain unavailability retries forever with bounded backoff;
/// only a definitively broken chain client escapes as an error.
pub async fn run(state: &AppState) -> Result<u64, ChainError> {
    let endpoint = state.endpoint().to_string();

    let sp_id = loop {
        match state.chain.sp_id_for_endpoint(&endpoint).await {
            Ok(0) => {
                info!(endpoint = %endpoint, "endpoint not yet registered as a service provider, retrying");
                tokio::time::sleep(SP_ID_RETRY).await;
            }
            Ok(sp_id) => break sp_id,
            Err(ChainError::Unavailable(reason)) => {
                warn!(error = %reason, "chain unavailable while resolving sp id, retrying");
                tokio::time::sleep(SP_ID_RETRY).await;
            }
            Err(e) => return Err(e),
        }
    };
    info!(sp_id, "service provider id resolved");

    let poll = registry_poll_interval(state.config.node.dev_mode);
    loop {
        match state.chain.registry_deployed().await {
            Ok(true) => break,
            Ok(false) => {
                info!("replica-set registry not yet deployed, polling");
                tokio::time::sleep(poll).await;
            }
            Err(ChainError::Unavailable(reason)) => {
                warn!(error = %reason, "chain unavailable while polling registry, retrying");
                tokio::time::sleep(poll).await;
            }
            Err(e) => return Err(e),
        }
    }

    loop {
        match state
            .chain
            .register(sp_id, &endpoint, &state.signer.public_key_hex())
            .await
        {
            Ok(()) => break,
            Err(ChainError::Unavailable(reason)) => {
                warn!(error = %reason, "registration failed, retrying");
                tokio::time::sleep(REGISTER_RETRY).await;
            }
            Err(e) => return Err(e),
        }
    }

    state.set_ready(sp_id).await;
    info!(sp_id, "identity bootstrap complete");
    Ok(sp_id)
}
