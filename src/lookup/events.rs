//! Usage events reported to the backend.
//!
//! Events are fire-and-forget: a failure to record one is logged and never
//! affects the scan it describes.

use super::LookupError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Source tag attached to every reported event.
pub const EVENT_SOURCE: &str = "originscan";

/// A usage event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// An accepted barcode that passed the quota check.
    BarcodeScan { barcode: String },
    /// A barcode resolved to its issuing country code.
    CountrySearch { barcode: String, country: String },
    /// A failure, with where it happened.
    Error { error: String, context: String },
}

impl ScanEvent {
    /// Backend method name.
    pub fn method(&self) -> &'static str {
        match self {
            ScanEvent::BarcodeScan { .. } => "BarcodeScan",
            ScanEvent::CountrySearch { .. } => "CountrySearch",
            ScanEvent::Error { .. } => "Error",
        }
    }

    /// String properties sent as the event body, stamped with `at` in ISO 8601.
    pub fn properties(&self, at: DateTime<Utc>) -> BTreeMap<&'static str, String> {
        let mut props = BTreeMap::new();
        match self {
            ScanEvent::BarcodeScan { barcode } => {
                props.insert("barcode", barcode.clone());
            }
            ScanEvent::CountrySearch { barcode, country } => {
                props.insert("barcode", barcode.clone());
                props.insert("country", country.clone());
            }
            ScanEvent::Error { error, context } => {
                props.insert("error", error.clone());
                props.insert("context", context.clone());
            }
        }
        props.insert("timestamp", at.to_rfc3339_opts(SecondsFormat::Secs, true));
        props
    }
}

/// Receives usage events.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn record(&self, event: &ScanEvent) -> Result<(), LookupError>;
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventLog;

#[async_trait]
impl EventLog for NoopEventLog {
    async fn record(&self, _event: &ScanEvent) -> Result<(), LookupError> {
        Ok(())
    }
}

/// Keeps events in memory, in the order they were recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventLog {
    events: Arc<Mutex<Vec<ScanEvent>>>,
}

impl RecordingEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EventLog for RecordingEventLog {
    async fn record(&self, event: &ScanEvent) -> Result<(), LookupError> {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_properties_carry_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let event = ScanEvent::CountrySearch {
            barcode: "4006381333931".to_string(),
            country: "DE".to_string(),
        };

        let props = event.properties(at);
        assert_eq!(event.method(), "CountrySearch");
        assert_eq!(props["barcode"], "4006381333931");
        assert_eq!(props["country"], "DE");
        assert_eq!(props["timestamp"], "2024-03-01T12:30:00Z");
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_error_properties() {
        let event = ScanEvent::Error {
            error: "no country known for barcode 99".to_string(),
            context: "country lookup".to_string(),
        };
        let props = event.properties(Utc::now());
        assert_eq!(event.method(), "Error");
        assert_eq!(props["context"], "country lookup");
        assert!(props.contains_key("timestamp"));
        assert!(!props.contains_key("barcode"));
    }

    #[tokio::test]
    async fn test_recording_log_keeps_order() {
        let log = RecordingEventLog::new();
        let first = ScanEvent::BarcodeScan {
            barcode: "1".to_string(),
        };
        let second = ScanEvent::BarcodeScan {
            barcode: "2".to_string(),
        };
        log.record(&first).await.unwrap();
        log.clone().record(&second).await.unwrap();

        assert_eq!(log.events(), vec![first, second]);
    }
}
