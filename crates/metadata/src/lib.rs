//! Metadata store abstraction and implementation for the chorus creator node.
//!
//! This crate provides the replica data model:
//! - User records keyed by wallet public key
//! - The per-user monotonic clock log
//! - File descriptors, tracks, and profile snapshots
//! - Transactional append / export-slice / truncate / sync-commit operations

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use chorus_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
