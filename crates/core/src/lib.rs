//! Core domain types and shared logic for the chorus creator node.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Wallet public keys (the cross-node user identity)
//! - Content identifiers and their storage layout
//! - Export payload wire types
//! - The configuration model
//! - Core error type

pub mod cid;
pub mod config;
pub mod error;
pub mod export;
pub mod wallet;

pub use cid::Cid;
pub use error::{Error, Result};
pub use export::{
    AudiusUserWire, ClockRecordWire, ExportData, ExportResponse, ExportedUser, FileType, FileWire,
    IpfsIdObj, TrackWire,
};
pub use wallet::WalletKey;

/// Clock value reported for a user that has no local record.
pub const CLOCK_UNKNOWN: i64 = -1;
