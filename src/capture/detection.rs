//! Symbol detections delivered by the platform decoder.

use crate::geometry::Rect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Barcode symbologies the capture pipeline is configured to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    #[default]
    Ean13,
    Ean8,
    UpcE,
}

/// A single decoded symbol.
///
/// Produced by the platform capability, consumed once by the gate, then
/// discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub symbol_value: String,
    pub symbology: Symbology,
    pub bounding_region: Rect,
    pub timestamp: DateTime<Utc>,
}

impl DetectionEvent {
    /// Creates an EAN-13 detection stamped with the current time.
    pub fn new(symbol_value: impl Into<String>, bounding_region: Rect) -> Self {
        Self {
            symbol_value: symbol_value.into(),
            symbology: Symbology::default(),
            bounding_region,
            timestamp: Utc::now(),
        }
    }

    pub fn with_symbology(mut self, symbology: Symbology) -> Self {
        self.symbology = symbology;
        self
    }
}
