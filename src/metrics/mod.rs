//! Prometheus metrics for scanner monitoring.
//!
//! # Metrics Exposed
//!
//! ## Capture Metrics
//! - `origin_scan_session_running` - Capture session state (1=running)
//! - `origin_scan_detections_seen_total` - Detections delivered
//! - `origin_scan_detections_ignored_total` - Detections outside the target frame
//! - `origin_scan_detections_accepted_total` - Detections accepted
//! - `origin_scan_detections_discarded_total` - Detections dropped while not running
//!
//! ## Ledger Metrics
//! - `origin_scan_ledger_charged_total` - Submissions that consumed a scan
//! - `origin_scan_ledger_refreshed_total` - Free repeat submissions
//! - `origin_scan_remaining_scans` - Remaining quota
//! - `origin_scan_history_entries` - History length
//! - `origin_scan_ledger_unsaved` - Last durable write failed
//!
//! # Example
//!
//! ```no_run
//! use origin_scan::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     is_running: true,
//!     detections_seen: 12,
//!     detections_accepted: 1,
//!     remaining_scans: 4,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
