//! In-process sync outcome aggregator.

use chorus_core::WalletKey;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;

/// Most recent outcome for one wallet.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub success: bool,
    /// Failure kind when unsuccessful.
    pub kind: Option<String>,
    pub at: OffsetDateTime,
}

/// Aggregated history for one wallet.
#[derive(Debug, Clone, Default)]
pub struct WalletHistory {
    pub success_count: u64,
    pub failure_count: u64,
    pub last_outcome: Option<SyncOutcome>,
}

/// Per-wallet success/failure counters with the latest outcome.
///
/// Purely in-process; this feeds operator visibility and tests, not the
/// failure gating (which lives in the coordination store).
#[derive(Default)]
pub struct SyncHistory {
    inner: Mutex<HashMap<WalletKey, WalletHistory>>,
}

impl SyncHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, wallet: &WalletKey) {
        let mut inner = self.inner.lock().expect("history mutex poisoned");
        let entry = inner.entry(wallet.clone()).or_default();
        entry.success_count += 1;
        entry.last_outcome = Some(SyncOutcome {
            success: true,
            kind: None,
            at: OffsetDateTime::now_utc(),
        });
    }

    pub fn record_failure(&self, wallet: &WalletKey, kind: &str) {
        let mut inner = self.inner.lock().expect("history mutex poisoned");
        let entry = inner.entry(wallet.clone()).or_default();
        entry.failure_count += 1;
        entry.last_outcome = Some(SyncOutcome {
            success: false,
            kind: Some(kind.to_string()),
            at: OffsetDateTime::now_utc(),
        });
    }

    pub fn get(&self, wallet: &WalletKey) -> Option<WalletHistory> {
        self.inner
            .lock()
            .expect("history mutex poisoned")
            .get(wallet)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let history = SyncHistory::new();
        let wallet = WalletKey::parse("0xaa").unwrap();

        history.record_success(&wallet);
        history.record_failure(&wallet, "export_invalid");
        history.record_success(&wallet);

        let entry = history.get(&wallet).unwrap();
        assert_eq!(entry.success_count, 2);
        assert_eq!(entry.failure_count, 1);
        assert!(entry.last_outcome.unwrap().success);
    }

    #[test]
    fn unknown_wallet_is_none() {
        let history = SyncHistory::new();
        assert!(history.get(&WalletKey::parse("0xbb").unwrap()).is_none());
    }
}
