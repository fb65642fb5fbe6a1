//! Reconciles accepted scans against the history and the scan quota.

use super::history::{ResolvedCountry, ScanHistoryItem};
use super::quota::QuotaState;
use super::store::{LedgerStore, StoreError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of submitting a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// A new entry was recorded and one scan was consumed.
    Charged(ScanHistoryItem),
    /// The barcode repeated the most recent entry; only its timestamp moved.
    Refreshed(ScanHistoryItem),
}

impl LedgerOutcome {
    pub fn item(&self) -> &ScanHistoryItem {
        match self {
            Self::Charged(item) | Self::Refreshed(item) => item,
        }
    }

    pub fn is_charged(&self) -> bool {
        matches!(self, Self::Charged(_))
    }
}

/// Errors reported by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The in-memory ledger already reflects the change; only the durable
    /// write failed. Do not resubmit, call `flush` instead.
    #[error("ledger updated but not persisted: {source}")]
    NotPersisted {
        outcome: Option<Box<LedgerOutcome>>,
        #[source]
        source: StoreError,
    },
    #[error("failed to load ledger: {0}")]
    Load(#[source] StoreError),
    #[error("ledger service is not running")]
    ServiceClosed,
}

impl LedgerError {
    /// Returns the applied outcome of a submission whose write failed.
    pub fn applied_outcome(&self) -> Option<&LedgerOutcome> {
        match self {
            Self::NotPersisted { outcome, .. } => outcome.as_deref(),
            _ => None,
        }
    }
}

/// The scan history and remaining quota, kept consistent with each other.
///
/// Only an immediately repeated barcode is free: scanning A, B, then A
/// again charges three times.
pub struct EntitlementLedger {
    store: Box<dyn LedgerStore>,
    history: Vec<ScanHistoryItem>,
    quota: QuotaState,
    /// Set when the last durable write failed.
    dirty: bool,
}

impl EntitlementLedger {
    /// Loads the ledger from `store`.
    ///
    /// A store that has never saved a quota starts with `free_scans`.
    pub fn open(store: Box<dyn LedgerStore>, free_scans: u32) -> Result<Self, LedgerError> {
        let stored = store.load().map_err(LedgerError::Load)?;
        let first_launch = stored.remaining.is_none();
        let quota = QuotaState::new(stored.remaining.unwrap_or(free_scans));

        let mut ledger = Self {
            store,
            history: stored.history,
            quota,
            dirty: first_launch,
        };

        tracing::info!(
            entries = ledger.history.len(),
            remaining = ledger.quota.remaining(),
            first_launch,
            "Entitlement ledger opened"
        );

        if first_launch {
            if let Err(err) = ledger.flush() {
                tracing::warn!(error = %err, "Initial quota not persisted");
            }
        }
        Ok(ledger)
    }

    /// Records a resolved scan stamped with the current time.
    pub fn submit(
        &mut self,
        barcode: &str,
        country: &ResolvedCountry,
    ) -> Result<LedgerOutcome, LedgerError> {
        self.submit_at(barcode, country, Utc::now())
    }

    /// Records a resolved scan at `now`.
    ///
    /// Does not check the quota; callers gate on [`can_submit`](Self::can_submit).
    pub fn submit_at(
        &mut self,
        barcode: &str,
        country: &ResolvedCountry,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LedgerError> {
        let repeat = self
            .history
            .first()
            .is_some_and(|latest| latest.barcode == barcode);

        let outcome = if repeat {
            let refreshed = self.history[0].refreshed(now);
            self.history[0] = refreshed.clone();
            tracing::debug!(barcode, "Repeat scan refreshed, no charge");
            LedgerOutcome::Refreshed(refreshed)
        } else {
            let item = ScanHistoryItem::new(barcode, country, now);
            self.history.insert(0, item.clone());
            if !self.quota.charge() {
                tracing::warn!(barcode, "Scan recorded with no quota remaining");
            }
            tracing::info!(
                barcode,
                country = %item.country_code,
                remaining = self.quota.remaining(),
                "Scan charged"
            );
            LedgerOutcome::Charged(item)
        };

        self.persist().map_err(|source| LedgerError::NotPersisted {
            outcome: Some(Box::new(outcome.clone())),
            source,
        })?;
        Ok(outcome)
    }

    /// Returns true if at least one scan remains.
    pub fn can_submit(&self) -> bool {
        self.quota.can_charge()
    }

    /// Removes every history entry. The quota is untouched.
    pub fn clear(&mut self) -> Result<(), LedgerError> {
        let removed = self.history.len();
        self.history.clear();
        tracing::info!(removed, "Scan history cleared");
        self.persist_without_outcome()
    }

    /// Adds purchased scans and returns the new remaining count.
    pub fn grant(&mut self, scans: u32) -> Result<u32, LedgerError> {
        self.quota.grant(scans);
        tracing::info!(scans, remaining = self.quota.remaining(), "Scans granted");
        self.persist_without_outcome()?;
        Ok(self.quota.remaining())
    }

    /// Retries the durable write after an earlier failure.
    pub fn flush(&mut self) -> Result<(), LedgerError> {
        if !self.dirty {
            return Ok(());
        }
        self.persist_without_outcome()
    }

    pub fn history(&self) -> &[ScanHistoryItem] {
        &self.history
    }

    pub fn remaining(&self) -> u32 {
        self.quota.remaining()
    }

    /// Returns true if the in-memory state has not been durably written.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn persist_without_outcome(&mut self) -> Result<(), LedgerError> {
        self.persist().map_err(|source| LedgerError::NotPersisted {
            outcome: None,
            source,
        })
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        match self.store.save(&self.history, self.quota.remaining()) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Ledger write failed");
                self.dirty = true;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for EntitlementLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementLedger")
            .field("entries", &self.history.len())
            .field("remaining", &self.quota.remaining())
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryStore, StoredLedger};
    use chrono::Duration;

    fn ledger_with(store: &MemoryStore, free_scans: u32) -> EntitlementLedger {
        EntitlementLedger::open(Box::new(store.clone()), free_scans).unwrap()
    }

    fn us() -> ResolvedCountry {
        ResolvedCountry::new("US", "United States", "United States")
    }

    #[test]
    fn test_first_launch_grants_free_scans() {
        let store = MemoryStore::new();
        let ledger = ledger_with(&store, 5);
        assert_eq!(ledger.remaining(), 5);
        assert_eq!(store.contents().remaining, Some(5));
    }

    #[test]
    fn test_saved_zero_quota_stays_zero() {
        let store = MemoryStore::with_contents(StoredLedger {
            history: Vec::new(),
            remaining: Some(0),
        });
        let ledger = ledger_with(&store, 5);
        assert_eq!(ledger.remaining(), 0);
        assert!(!ledger.can_submit());
    }

    #[test]
    fn test_immediate_repeat_is_free() {
        let store = MemoryStore::new();
        let mut ledger = ledger_with(&store, 5);
        let first = Utc::now();
        let second = first + Duration::seconds(10);

        let a = ledger.submit_at("123", &us(), first).unwrap();
        let b = ledger.submit_at("123", &us(), second).unwrap();

        assert!(a.is_charged());
        assert!(matches!(b, LedgerOutcome::Refreshed(_)));
        assert_eq!(ledger.remaining(), 4);
        assert_eq!(ledger.history().len(), 1);
        assert_eq!(ledger.history()[0].scanned_at, second);
        assert_eq!(ledger.history()[0].id, a.item().id);
    }

    #[test]
    fn test_non_consecutive_repeat_is_charged() {
        let store = MemoryStore::new();
        let mut ledger = ledger_with(&store, 5);

        for barcode in ["123", "456", "123"] {
            assert!(ledger.submit(barcode, &us()).unwrap().is_charged());
        }

        assert_eq!(ledger.remaining(), 2);
        let barcodes: Vec<_> = ledger.history().iter().map(|i| i.barcode.as_str()).collect();
        assert_eq!(barcodes, ["123", "456", "123"]);
    }

    #[test]
    fn test_quota_never_negative() {
        let store = MemoryStore::new();
        let mut ledger = ledger_with(&store, 1);

        for (i, barcode) in ["1", "2", "3"].iter().enumerate() {
            let before = ledger.remaining();
            ledger.submit(barcode, &us()).unwrap();
            assert!(ledger.remaining() >= before.saturating_sub(1), "step {i}");
        }
        assert_eq!(ledger.remaining(), 0);
        assert_eq!(ledger.history().len(), 3);
    }

    #[test]
    fn test_clear_keeps_quota() {
        let store = MemoryStore::new();
        let mut ledger = ledger_with(&store, 5);
        ledger.submit("123", &us()).unwrap();

        ledger.clear().unwrap();

        assert!(ledger.history().is_empty());
        assert_eq!(ledger.remaining(), 4);
        assert!(store.contents().history.is_empty());
        // After clearing, the same barcode is new again.
        assert!(ledger.submit("123", &us()).unwrap().is_charged());
    }

    #[test]
    fn test_grant_adds_scans() {
        let store = MemoryStore::new();
        let mut ledger = ledger_with(&store, 0);
        assert!(!ledger.can_submit());
        assert_eq!(ledger.grant(100).unwrap(), 100);
        assert_eq!(store.contents().remaining, Some(100));
    }

    #[test]
    fn test_failed_write_keeps_in_memory_outcome() {
        let store = MemoryStore::new();
        let mut ledger = ledger_with(&store, 5);
        store.set_failing(true);

        let err = ledger.submit("123", &us()).unwrap_err();
        let outcome = err.applied_outcome().unwrap();
        assert!(outcome.is_charged());
        assert_eq!(ledger.remaining(), 4);
        assert_eq!(ledger.history().len(), 1);
        assert!(ledger.is_dirty());
        assert_eq!(store.contents().remaining, Some(5));

        store.set_failing(false);
        ledger.flush().unwrap();
        assert!(!ledger.is_dirty());
        assert_eq!(store.contents().remaining, Some(4));
        assert_eq!(store.contents().history.len(), 1);
    }

    #[test]
    fn test_reopen_restores_state() {
        let store = MemoryStore::new();
        {
            let mut ledger = ledger_with(&store, 5);
            ledger.submit("123", &us()).unwrap();
            ledger.submit("456", &us()).unwrap();
        }
        let ledger = ledger_with(&store, 5);
        assert_eq!(ledger.remaining(), 3);
        assert_eq!(ledger.history()[0].barcode, "456");
    }
}
