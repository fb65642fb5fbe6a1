//! Scan history and quota reconciliation.
//!
//! The ledger decides whether an accepted barcode consumes a scan and
//! persists history and quota together.

mod countries;
mod entitlement;
mod history;
mod quota;
mod store;

pub use countries::{country_list, country_name, is_known_country};
pub use entitlement::{EntitlementLedger, LedgerError, LedgerOutcome};
pub use history::{flag_glyph, ResolvedCountry, ScanHistoryItem};
pub use quota::QuotaState;
pub use store::{JsonFileStore, LedgerStore, MemoryStore, StoreError, StoredLedger};

pub(crate) use store::{read_json, write_json_atomic};
