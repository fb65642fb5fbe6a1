//! Metrics collection and registry.

use crate::capture::CaptureState;
use crate::service::{LedgerView, SessionView};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of scanner state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the capture session is running.
    pub is_running: bool,
    /// Detections delivered to the orchestrator.
    pub detections_seen: u64,
    /// Detections rejected by the target frame.
    pub detections_ignored: u64,
    pub detections_accepted: u64,
    /// Detections dropped because the session was not running.
    pub detections_discarded: u64,
    pub ledger_charged: u64,
    pub ledger_refreshed: u64,
    pub remaining_scans: u32,
    pub history_len: usize,
    /// Whether the last ledger write failed.
    pub ledger_unsaved: bool,
}

/// Prometheus metrics registry for scanner monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Capture metrics
    session_running: IntGauge,
    detections_seen: IntCounter,
    detections_ignored: IntCounter,
    detections_accepted: IntCounter,
    detections_discarded: IntCounter,

    // Ledger metrics
    ledger_charged: IntCounter,
    ledger_refreshed: IntCounter,
    remaining_scans: IntGauge,
    history_len: IntGauge,
    ledger_unsaved: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all scanner metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_running = IntGauge::new(
            "origin_scan_session_running",
            "Capture session state (1=running, 0=otherwise)",
        )?;
        let detections_seen = IntCounter::new(
            "origin_scan_detections_seen_total",
            "Detections delivered by the capture pipeline",
        )?;
        let detections_ignored = IntCounter::new(
            "origin_scan_detections_ignored_total",
            "Detections outside the target frame",
        )?;
        let detections_accepted = IntCounter::new(
            "origin_scan_detections_accepted_total",
            "Detections accepted and forwarded",
        )?;
        let detections_discarded = IntCounter::new(
            "origin_scan_detections_discarded_total",
            "Detections dropped while the session was not running",
        )?;

        let ledger_charged = IntCounter::new(
            "origin_scan_ledger_charged_total",
            "Submissions that consumed a scan",
        )?;
        let ledger_refreshed = IntCounter::new(
            "origin_scan_ledger_refreshed_total",
            "Repeat submissions that only refreshed the latest entry",
        )?;
        let remaining_scans = IntGauge::new(
            "origin_scan_remaining_scans",
            "Scans remaining in the quota",
        )?;
        let history_len = IntGauge::new(
            "origin_scan_history_entries",
            "Entries in the scan history",
        )?;
        let ledger_unsaved = IntGauge::new(
            "origin_scan_ledger_unsaved",
            "Ledger state not yet durably written (1=unsaved)",
        )?;

        registry.register(Box::new(session_running.clone()))?;
        registry.register(Box::new(detections_seen.clone()))?;
        registry.register(Box::new(detections_ignored.clone()))?;
        registry.register(Box::new(detections_accepted.clone()))?;
        registry.register(Box::new(detections_discarded.clone()))?;
        registry.register(Box::new(ledger_charged.clone()))?;
        registry.register(Box::new(ledger_refreshed.clone()))?;
        registry.register(Box::new(remaining_scans.clone()))?;
        registry.register(Box::new(history_len.clone()))?;
        registry.register(Box::new(ledger_unsaved.clone()))?;

        Ok(Self {
            registry,
            session_running,
            detections_seen,
            detections_ignored,
            detections_accepted,
            detections_discarded,
            ledger_charged,
            ledger_refreshed,
            remaining_scans,
            history_len,
            ledger_unsaved,
        })
    }

    /// Updates all metrics from a snapshot of scanner state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.session_running.set(i64::from(snapshot.is_running));

        // Counters only move forward; increment by the difference.
        advance(&self.detections_seen, snapshot.detections_seen);
        advance(&self.detections_ignored, snapshot.detections_ignored);
        advance(&self.detections_accepted, snapshot.detections_accepted);
        advance(&self.detections_discarded, snapshot.detections_discarded);
        advance(&self.ledger_charged, snapshot.ledger_charged);
        advance(&self.ledger_refreshed, snapshot.ledger_refreshed);

        self.remaining_scans.set(i64::from(snapshot.remaining_scans));
        self.history_len.set(snapshot.history_len as i64);
        self.ledger_unsaved.set(i64::from(snapshot.ledger_unsaved));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the published session and ledger views.
    pub fn from_views(session: &SessionView, ledger: &LedgerView) -> Self {
        Self {
            is_running: session.state == CaptureState::Running,
            detections_seen: session.stats.seen,
            detections_ignored: session.stats.ignored,
            detections_accepted: session.stats.accepted,
            detections_discarded: session.stats.discarded,
            ledger_charged: ledger.charged,
            ledger_refreshed: ledger.refreshed,
            remaining_scans: ledger.remaining,
            history_len: ledger.history.len(),
            ledger_unsaved: ledger.unsaved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            is_running: true,
            detections_seen: 10,
            detections_ignored: 7,
            detections_accepted: 2,
            detections_discarded: 1,
            ledger_charged: 2,
            ledger_refreshed: 0,
            remaining_scans: 3,
            history_len: 2,
            ledger_unsaved: false,
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("origin_scan_session_running 1"));
        assert!(output.contains("origin_scan_detections_seen_total 10"));
        assert!(output.contains("origin_scan_remaining_scans 3"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            detections_seen: 5,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            detections_seen: 3,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("origin_scan_detections_seen_total 5"));
    }

    #[test]
    fn test_snapshot_from_views() {
        let session = SessionView {
            state: CaptureState::Paused,
            facing: Default::default(),
            gating_enabled: true,
            target_frame: None,
            torch_on: false,
            zoom_factor: 1.0,
            requested_zoom: None,
            stats: Default::default(),
        };
        let ledger = LedgerView {
            remaining: 4,
            charged: 1,
            ..Default::default()
        };

        let snapshot = MetricsSnapshot::from_views(&session, &ledger);
        assert!(!snapshot.is_running);
        assert_eq!(snapshot.remaining_scans, 4);
        assert_eq!(snapshot.ledger_charged, 1);
        assert_eq!(snapshot.history_len, 0);
    }
}
