//! Chain oracle abstraction for the chorus creator node.
//!
//! The chain records who the service providers are and which triple of them
//! replicates each user. This crate defines the client trait plus an
//! in-memory mock; the production RPC client lives outside this repository
//! and plugs in behind the same trait.

pub mod client;
pub mod error;
pub mod mock;

pub use client::{ChainClient, ReplicaSet, ServiceProvider};
pub use error::{ChainError, ChainResult};
pub use mock::MockChainClient;
