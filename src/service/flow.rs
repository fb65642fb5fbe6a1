//! Accepted barcode to ledger entry.

use super::ledger::LedgerHandle;
use crate::ledger::{LedgerError, LedgerOutcome};
use crate::lookup::{normalize_barcode, CountryLookup, EventLog, LookupError, ScanEvent};
use thiserror::Error;

/// Errors that can occur while processing an accepted barcode.
#[derive(Debug, Error)]
pub enum FlowError {
    /// No scans remain; nothing was looked up or recorded.
    #[error("no scans remaining")]
    QuotaExhausted,
    /// The country could not be resolved; nothing was recorded.
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

async fn report(events: &dyn EventLog, event: ScanEvent) {
    if let Err(err) = events.record(&event).await {
        tracing::warn!(method = event.method(), error = %err, "Event not recorded");
    }
}

/// Resolves the issuing country of `barcode` and records it.
///
/// The quota is checked before the lookup, so an exhausted quota never costs
/// a network round-trip. A failed lookup is never submitted.
///
/// A scan that passes the quota check is reported to `events`, followed by
/// either the resolved country or the lookup error. Reporting failures are
/// logged and otherwise ignored.
pub async fn process_barcode(
    ledger: &LedgerHandle,
    lookup: &dyn CountryLookup,
    events: &dyn EventLog,
    barcode: &str,
) -> Result<LedgerOutcome, FlowError> {
    let barcode = normalize_barcode(barcode)?;

    if !ledger.can_submit().await {
        tracing::info!(barcode = %barcode, "Scan refused, quota exhausted");
        return Err(FlowError::QuotaExhausted);
    }

    let event = ScanEvent::BarcodeScan {
        barcode: barcode.clone(),
    };
    report(events, event).await;

    let country = match lookup.lookup(&barcode).await {
        Ok(country) => country,
        Err(err) => {
            tracing::warn!(barcode = %barcode, error = %err, "Country lookup failed");
            let event = ScanEvent::Error {
                error: err.to_string(),
                context: format!("country lookup for {}", barcode),
            };
            report(events, event).await;
            return Err(err.into());
        }
    };

    let event = ScanEvent::CountrySearch {
        barcode: barcode.clone(),
        country: country.code.clone(),
    };
    report(events, event).await;

    Ok(ledger.submit(barcode, country).await?)
}
