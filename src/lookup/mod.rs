//! Country-of-origin lookup for barcodes.
//!
//! The lookup is an external collaborator: this crate only hands it a
//! barcode and receives a country code or an error. Usage events go to a
//! separate [`EventLog`].

mod events;
#[cfg(feature = "http")]
mod http;

pub use events::{EventLog, NoopEventLog, RecordingEventLog, ScanEvent, EVENT_SOURCE};
#[cfg(feature = "http")]
pub use http::{HttpCountryLookup, HttpEventLog};

use crate::ledger::ResolvedCountry;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while resolving a barcode.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("barcode is empty")]
    EmptyBarcode,
    #[error("no country known for barcode {0}")]
    NotFound(String),
    #[cfg(feature = "http")]
    #[error("lookup request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("lookup service returned status {0}")]
    Status(u16),
    #[error("malformed lookup response: {0}")]
    MalformedResponse(String),
    #[cfg(feature = "http")]
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Resolves a barcode to the country that issued it.
#[async_trait]
pub trait CountryLookup: Send + Sync {
    async fn lookup(&self, barcode: &str) -> Result<ResolvedCountry, LookupError>;
}

/// Trims manual input and rejects empty barcodes.
pub fn normalize_barcode(input: &str) -> Result<String, LookupError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LookupError::EmptyBarcode);
    }
    Ok(trimmed.to_string())
}

/// Lookup backed by a fixed table, for tests and offline use.
///
/// Barcodes are matched exactly first, then by their longest registered
/// prefix.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    entries: HashMap<String, ResolvedCountry>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a barcode or barcode prefix to a country.
    pub fn with(mut self, barcode_or_prefix: impl Into<String>, country: ResolvedCountry) -> Self {
        self.entries.insert(barcode_or_prefix.into(), country);
        self
    }
}

#[async_trait]
impl CountryLookup for StaticLookup {
    async fn lookup(&self, barcode: &str) -> Result<ResolvedCountry, LookupError> {
        let barcode = normalize_barcode(barcode)?;
        (1..=barcode.len())
            .rev()
            .filter_map(|len| barcode.get(..len))
            .find_map(|prefix| self.entries.get(prefix))
            .cloned()
            .ok_or(LookupError::NotFound(barcode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_barcode() {
        assert_eq!(normalize_barcode("  4006381333931 \n").unwrap(), "4006381333931");
        assert!(matches!(normalize_barcode("   "), Err(LookupError::EmptyBarcode)));
    }

    #[tokio::test]
    async fn test_static_lookup_prefers_longest_prefix() {
        let lookup = StaticLookup::new()
            .with("40", ResolvedCountry::from_code("DE"))
            .with("400638", ResolvedCountry::from_code("AT"));

        assert_eq!(lookup.lookup("4006381333931").await.unwrap().code, "AT");
        assert_eq!(lookup.lookup("4012345678901").await.unwrap().code, "DE");
        assert!(matches!(
            lookup.lookup("0012345678905").await,
            Err(LookupError::NotFound(_))
        ));
    }
}
