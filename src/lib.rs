//! Origin Scan Library
//!
//! Barcode scan capture and entitlement reconciliation. A camera session
//! delivers decoded symbols; a geometry gate decides which of them were
//! aimed at the on-screen target frame; accepted barcodes are resolved to
//! their issuing country and recorded against a scan quota.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → orchestrator (geometry gate) → lookup → ledger
//!    ↑            │                                    ↑
//!    └── pause ───┘                          purchase grants
//! ```
//!
//! # Design Principles
//!
//! - **One accept per resume**: an accepted detection pauses capture before
//!   any later detection is evaluated
//! - **Quota is checked, not assumed**: callers gate on `can_submit` before
//!   resolving a barcode
//! - **History and quota move together**: both are persisted in one write
//! - **Platform stays outside**: camera, permission prompt, persistence and
//!   lookup are traits with mock implementations
//!
//! # Example
//!
//! ```no_run
//! use origin_scan::{
//!     capture::{MockCameraDevice, StaticPermission},
//!     config::{LedgerConfig, ScannerConfig},
//!     ledger::MemoryStore,
//!     service::Scanner,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = Scanner::new(
//!     Box::new(MockCameraDevice::new()),
//!     Arc::new(StaticPermission::authorized()),
//!     Box::new(MemoryStore::new()),
//! );
//! let (handle, _tasks) = scanner.spawn(&ScannerConfig::default(), &LedgerConfig::default())?;
//!
//! let mut actions = handle.subscribe_actions();
//! handle.start_default_session().await?;
//!
//! // Feed detections from the platform pipeline through
//! // `handle.detection_sender()`, then react to accepted barcodes.
//! while let Ok(action) = actions.recv().await {
//!     println!("{action:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod geometry;
pub mod ledger;
pub mod lookup;
pub mod metrics;
pub mod orchestrator;
pub mod preferences;
pub mod purchase;
pub mod service;

// Re-export commonly used types at crate root
pub use capture::{
    CameraDevice, CameraFacing, CaptureError, CaptureSession, CaptureState, DetectionEvent,
    MockCameraDevice, PermissionAuthority,
};
pub use config::FileConfig;
pub use geometry::{compute_zoom, Rect, TargetFrame};
pub use ledger::{EntitlementLedger, LedgerOutcome, ResolvedCountry, ScanHistoryItem};
pub use lookup::{CountryLookup, EventLog, LookupError, ScanEvent};
pub use orchestrator::{on_detection, OrchestratorAction, ScanOrchestrator};
pub use service::{LedgerHandle, Scanner, ScannerHandle};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
