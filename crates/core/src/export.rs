//! Export payload wire types.
//!
//! The export is the unit of replication: a contiguous slice of one or more
//! users' clock logs plus the entity rows written at those clocks. The JSON
//! field names here are the wire protocol; peers on different versions must
//! agree on them.

use crate::wallet::WalletKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Top-level `/export` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub data: ExportData,
}

/// Export payload: per-wallet user state plus the serving node's addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    /// Wallet public key -> exported user state. Unknown wallets are absent.
    pub cnode_users: BTreeMap<WalletKey, ExportedUser>,
    pub ipfs_id_obj: IpfsIdObj,
}

/// Addresses the serving node advertises for content fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfsIdObj {
    pub addresses: Vec<String>,
}

/// One user's exported state: the user record and the log slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedUser {
    pub wallet_public_key: WalletKey,
    /// Highest clock the payload's records reach. Trails the exporting
    /// node's full clock when the export window truncated the slice;
    /// receivers commit up to here and request the remainder later.
    pub clock: i64,
    pub latest_block_number: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub clock_records: Vec<ClockRecordWire>,
    pub files: Vec<FileWire>,
    pub tracks: Vec<TrackWire>,
    pub audius_users: Vec<AudiusUserWire>,
}

/// One clock-log row on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockRecordWire {
    pub clock: i64,
    pub source_table: String,
    pub source_row_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// File descriptor on the wire. Storage paths are node-local and therefore
/// not transmitted; the receiver derives its own path from the multihash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWire {
    pub clock: i64,
    pub multihash: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub track_blockchain_id: Option<i64>,
    pub dir_multihash: Option<String>,
    pub file_name: Option<String>,
    /// Declared content size, when the exporter knows it. Used by receivers
    /// to scale fetch timeouts.
    pub size_bytes: Option<i64>,
    pub skipped: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Track record on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackWire {
    pub track_blockchain_id: i64,
    pub clock: i64,
    pub metadata_multihash: String,
    pub cover_art_multihash: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Per-user profile snapshot on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudiusUserWire {
    pub clock: i64,
    pub metadata_multihash: String,
    pub cover_photo: Option<String>,
    pub profile_picture: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Kinds of content a file descriptor can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Track,
    Image,
    Metadata,
    Copy320,
    Dir,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Image => "image",
            Self::Metadata => "metadata",
            Self::Copy320 => "copy320",
            Self::Dir => "dir",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "track" => Ok(Self::Track),
            "image" => Ok(Self::Image),
            "metadata" => Ok(Self::Metadata),
            "copy320" => Ok(Self::Copy320),
            "dir" => Ok(Self::Dir),
            other => Err(crate::Error::InvalidFileType(other.to_string())),
        }
    }

    /// Track-audio variants are fetched after all other content so a
    /// partially synced user has metadata and art before audio.
    pub fn is_track_content(&self) -> bool {
        matches!(self, Self::Track | Self::Copy320)
    }
}

impl ExportedUser {
    /// Validate the schema invariants of an exported user against the clock
    /// range the caller requested.
    ///
    /// Clock records must be sorted ascending, dense, start at exactly
    /// `requested_min` (when non-empty), and end at the exported `clock`.
    pub fn validate(&self, requested_min: i64) -> crate::Result<()> {
        if self.clock_records.is_empty() {
            return Ok(());
        }
        let first = self.clock_records[0].clock;
        if first != requested_min {
            return Err(crate::Error::InvalidExport(format!(
                "clock records start at {first}, requested {requested_min}"
            )));
        }
        for pair in self.clock_records.windows(2) {
            if pair[1].clock != pair[0].clock + 1 {
                return Err(crate::Error::InvalidExport(format!(
                    "clock gap between {} and {}",
                    pair[0].clock, pair[1].clock
                )));
            }
        }
        let last = self.clock_records[self.clock_records.len() - 1].clock;
        if last != self.clock {
            return Err(crate::Error::InvalidExport(format!(
                "clock records end at {last} but user clock is {}",
                self.clock
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_clocks(clocks: &[i64]) -> ExportedUser {
        let now = OffsetDateTime::now_utc();
        ExportedUser {
            wallet_public_key: WalletKey::parse("0xaa").unwrap(),
            clock: clocks.last().copied().unwrap_or(-1),
            latest_block_number: 0,
            last_login: None,
            created_at: now,
            clock_records: clocks
                .iter()
                .map(|&clock| ClockRecordWire {
                    clock,
                    source_table: "files".to_string(),
                    source_row_id: "x".to_string(),
                    created_at: now,
                })
                .collect(),
            files: vec![],
            tracks: vec![],
            audius_users: vec![],
        }
    }

    #[test]
    fn validates_dense_range() {
        assert!(user_with_clocks(&[3, 4, 5]).validate(3).is_ok());
        assert!(user_with_clocks(&[]).validate(0).is_ok());
    }

    #[test]
    fn rejects_wrong_start() {
        assert!(user_with_clocks(&[4, 5]).validate(3).is_err());
    }

    #[test]
    fn rejects_gap() {
        assert!(user_with_clocks(&[3, 5]).validate(3).is_err());
    }

    #[test]
    fn rejects_trailing_mismatch() {
        let mut user = user_with_clocks(&[3, 4]);
        user.clock = 9;
        assert!(user.validate(3).is_err());
    }
}
