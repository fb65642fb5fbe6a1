//! HTTP country lookup and event reporting against the backend.

use super::{normalize_barcode, CountryLookup, EventLog, LookupError, ScanEvent, EVENT_SOURCE};
use crate::config::LookupConfig;
use crate::ledger::ResolvedCountry;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuingCountryResponse {
    issuing_country: Option<String>,
}

/// Calls `GET {base}/api/ean/issuing-country?ean={barcode}`.
#[derive(Debug, Clone)]
pub struct HttpCountryLookup {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCountryLookup {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint_for(&config.base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint_for(base_url: &str) -> String {
    format!("{}/api/ean/issuing-country", base_url.trim_end_matches('/'))
}

fn event_endpoint_for(base_url: &str) -> String {
    format!("{}/api/log/event", base_url.trim_end_matches('/'))
}

fn event_query(event: &ScanEvent) -> [(&'static str, &'static str); 2] {
    [("method", event.method()), ("source", EVENT_SOURCE)]
}

fn parse_response(body: &[u8]) -> Result<ResolvedCountry, LookupError> {
    let response: IssuingCountryResponse =
        serde_json::from_slice(body).map_err(|e| LookupError::MalformedResponse(e.to_string()))?;
    match response.issuing_country {
        Some(code) if !code.trim().is_empty() => Ok(ResolvedCountry::from_code(code)),
        _ => Err(LookupError::MalformedResponse(
            "missing issuingCountry".to_string(),
        )),
    }
}

#[async_trait]
impl CountryLookup for HttpCountryLookup {
    async fn lookup(&self, barcode: &str) -> Result<ResolvedCountry, LookupError> {
        let barcode = normalize_barcode(barcode)?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("ean", barcode.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%barcode, status = status.as_u16(), "Country lookup rejected");
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let country = parse_response(&body)?;
        tracing::debug!(%barcode, country = %country.code, "Country resolved");
        Ok(country)
    }
}

/// Posts events to `{base}/api/log/event?method={method}&source=originscan`
/// with the properties as a JSON object.
#[derive(Debug, Clone)]
pub struct HttpEventLog {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventLog {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: event_endpoint_for(&config.base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventLog for HttpEventLog {
    async fn record(&self, event: &ScanEvent) -> Result<(), LookupError> {
        let body = serde_json::to_vec(&event.properties(Utc::now()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&event_query(event))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }
        tracing::trace!(method = event.method(), "Event recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint_for("https://example.com/"),
            "https://example.com/api/ean/issuing-country"
        );
    }

    #[test]
    fn test_event_endpoint_and_query() {
        assert_eq!(
            event_endpoint_for("https://example.com/"),
            "https://example.com/api/log/event"
        );
        let event = ScanEvent::BarcodeScan {
            barcode: "123".to_string(),
        };
        assert_eq!(
            event_query(&event),
            [("method", "BarcodeScan"), ("source", "originscan")]
        );
    }

    #[test]
    fn test_event_log_uses_configured_base() {
        let config = LookupConfig {
            base_url: "http://localhost:8080".to_string(),
            ..LookupConfig::default()
        };
        let log = HttpEventLog::new(&config).unwrap();
        assert_eq!(log.endpoint(), "http://localhost:8080/api/log/event");
    }

    #[test]
    fn test_parse_response() {
        let country = parse_response(br#"{"issuingCountry":"de"}"#).unwrap();
        assert_eq!(country.code, "DE");
        assert_eq!(country.name_primary, "Germany");

        assert!(matches!(
            parse_response(br#"{"issuingCountry":""}"#),
            Err(LookupError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_response(b"<html>"),
            Err(LookupError::MalformedResponse(_))
        ));
    }
}
