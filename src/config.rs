//! Scanner configuration.
//!
//! The target frame is fixed for the lifetime of a session; gating can be
//! toggled at runtime but starts from the configured default.

use crate::capture::CameraFacing;
use crate::geometry::TargetFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the capture engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Width of the live view the frame is centred in.
    pub view_width: f64,
    /// Target frame width (3:2 with the height).
    pub frame_width: f64,
    /// Target frame height.
    pub frame_height: f64,
    /// Distance from the top of the view to the frame.
    pub frame_top_offset: f64,
    /// Length of each overlay corner-marker segment.
    pub corner_marker_length: f64,
    /// Restrict acceptance to the target frame.
    pub gating_enabled: bool,
    /// Camera opened when a session starts.
    pub initial_facing: CameraFacing,
    /// Detections buffered between the capture pipeline and the engine.
    pub detection_queue_capacity: usize,
    /// Orchestrator actions buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            view_width: 390.0,
            frame_width: 300.0,
            frame_height: 200.0,
            frame_top_offset: 120.0,
            corner_marker_length: 20.0,
            gating_enabled: true,
            initial_facing: CameraFacing::Back,
            detection_queue_capacity: 32,
            event_capacity: 64,
        }
    }
}

impl ScannerConfig {
    /// Returns the target frame described by this configuration.
    pub fn target_frame(&self) -> TargetFrame {
        TargetFrame::centered(
            self.view_width,
            self.frame_width,
            self.frame_height,
            self.frame_top_offset,
        )
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [self.view_width, self.frame_width, self.frame_height];
        if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(ConfigError::InvalidFrame);
        }
        if self.frame_width > self.view_width {
            return Err(ConfigError::InvalidFrame);
        }
        if !self.frame_top_offset.is_finite() || self.frame_top_offset < 0.0 {
            return Err(ConfigError::InvalidFrame);
        }
        if self.detection_queue_capacity == 0 || self.event_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        Ok(())
    }
}

/// Configuration for the scan quota and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Scans granted the first time the ledger is opened.
    pub free_scans: u32,
    /// Scans granted per verified purchase.
    pub scans_per_purchase: u32,
    /// Store product that grants scans.
    pub product_id: String,
    /// JSON file holding history and quota.
    pub history_path: PathBuf,
    /// JSON file holding country preferences.
    pub preferences_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            free_scans: 5,
            scans_per_purchase: 100,
            product_id: "com.scorpioxinc.OriginScan.100scans".to_string(),
            history_path: PathBuf::from("origin-scan/ledger.json"),
            preferences_path: PathBuf::from("origin-scan/preferences.json"),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scans_per_purchase == 0 {
            return Err(ConfigError::InvalidPurchaseGrant);
        }
        if self.product_id.trim().is_empty() {
            return Err(ConfigError::MissingProductId);
        }
        Ok(())
    }
}

/// Configuration for the country lookup service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Report usage events to the backend.
    pub log_events: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: "https://scorpioplayer.com".to_string(),
            timeout_secs: 10,
            log_events: false,
        }
    }
}

impl LookupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid target frame geometry")]
    InvalidFrame,
    #[error("channel capacities must be non-zero")]
    InvalidCapacity,
    #[error("scans per purchase must be non-zero")]
    InvalidPurchaseGrant,
    #[error("purchase product id is empty")]
    MissingProductId,
    #[error("lookup base url must be http(s): {0}")]
    InvalidBaseUrl(String),
    #[error("lookup timeout must be non-zero")]
    InvalidTimeout,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scanner.validate()?;
        self.ledger.validate()?;
        self.lookup.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_target_frame() {
        let frame = ScannerConfig::default().target_frame();
        assert_eq!(*frame.rect(), Rect::new(45.0, 120.0, 300.0, 200.0));
    }

    #[test]
    fn test_frame_wider_than_view_invalid() {
        let config = ScannerConfig {
            frame_width: 500.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFrame)));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [scanner]
            gating_enabled = false
            initial_facing = "front"

            [ledger]
            free_scans = 3

            [lookup]
            log_events = true
            "#,
        )
        .unwrap();

        assert!(!config.scanner.gating_enabled);
        assert_eq!(config.scanner.initial_facing, CameraFacing::Front);
        assert_eq!(config.scanner.frame_width, 300.0);
        assert_eq!(config.ledger.free_scans, 3);
        assert_eq!(config.ledger.scans_per_purchase, 100);
        assert_eq!(config.lookup.timeout_secs, 10);
        assert!(config.lookup.log_events);
        assert!(!LookupConfig::default().log_events);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = FileConfig::from_toml("[lookup]\nbase_url = \"ftp://example.com\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }
}
