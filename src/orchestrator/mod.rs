//! Seam between detection gating and business effects.
//!
//! The orchestrator decides what a detection means for the capture session
//! and reports it. It never charges quota or calls the network; the caller
//! resolves the country and submits to the ledger.

use crate::capture::{CaptureSession, DetectionEvent, PauseCause};
use crate::geometry::{self, TargetFrame};
use serde::{Deserialize, Serialize};

/// What became of a detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "barcode", rename_all = "snake_case")]
pub enum OrchestratorAction {
    /// Outside the target frame; capture keeps running.
    Ignored,
    /// Accepted; capture is paused until resumed.
    Accepted(String),
}

/// Classifies a detection against the target frame.
pub fn on_detection(
    event: &DetectionEvent,
    target_frame: &TargetFrame,
    gating_enabled: bool,
) -> OrchestratorAction {
    if geometry::accepts(&event.bounding_region, target_frame, gating_enabled) {
        OrchestratorAction::Accepted(event.symbol_value.clone())
    } else {
        OrchestratorAction::Ignored
    }
}

/// Running totals of detection handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Every detection delivered.
    pub seen: u64,
    /// Dropped because the session was not running.
    pub discarded: u64,
    /// Rejected by the gate.
    pub ignored: u64,
    pub accepted: u64,
}

/// Applies the gate to detections and pauses the session on acceptance.
#[derive(Debug, Default)]
pub struct ScanOrchestrator {
    stats: DetectionStats,
}

impl ScanOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one detection.
    ///
    /// Returns `None` when the session is not running; such a detection
    /// raced the pause or teardown and is dropped. An accepted detection
    /// pauses the session, so the same symbol cannot be forwarded twice.
    pub fn handle(
        &mut self,
        session: &mut CaptureSession,
        event: &DetectionEvent,
    ) -> Option<OrchestratorAction> {
        self.stats.seen += 1;

        let frame = match session.target_frame() {
            Some(frame) if session.admits_detections() => *frame,
            _ => {
                self.stats.discarded += 1;
                tracing::trace!(state = %session.state(), "Detection discarded");
                return None;
            }
        };

        let action = on_detection(event, &frame, session.gating_enabled());
        match &action {
            OrchestratorAction::Accepted(barcode) => {
                self.stats.accepted += 1;
                session.pause(PauseCause::Accepted);
                tracing::info!(
                    barcode = %barcode,
                    symbology = ?event.symbology,
                    "Barcode accepted"
                );
            }
            OrchestratorAction::Ignored => {
                self.stats.ignored += 1;
                tracing::debug!(region = ?event.bounding_region, "Detection outside target frame");
            }
        }
        Some(action)
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraFacing, CaptureState, MockCameraDevice, PermissionStatus};
    use crate::geometry::Rect;

    fn frame() -> TargetFrame {
        TargetFrame::new(Rect::new(100.0, 100.0, 300.0, 200.0))
    }

    fn running_session(gating: bool) -> CaptureSession {
        let mut session =
            CaptureSession::new(Box::new(MockCameraDevice::new()), CameraFacing::Back);
        session
            .start(frame(), gating, PermissionStatus::Authorized)
            .unwrap();
        session
    }

    fn inside(value: &str) -> DetectionEvent {
        DetectionEvent::new(value, Rect::new(150.0, 150.0, 50.0, 50.0))
    }

    fn outside(value: &str) -> DetectionEvent {
        DetectionEvent::new(value, Rect::new(380.0, 150.0, 50.0, 50.0))
    }

    #[test]
    fn test_on_detection_classifies() {
        assert_eq!(
            on_detection(&inside("123"), &frame(), true),
            OrchestratorAction::Accepted("123".to_string())
        );
        assert_eq!(
            on_detection(&outside("123"), &frame(), true),
            OrchestratorAction::Ignored
        );
        assert_eq!(
            on_detection(&outside("123"), &frame(), false),
            OrchestratorAction::Accepted("123".to_string())
        );
    }

    #[test]
    fn test_ignored_detection_keeps_running() {
        let mut session = running_session(true);
        let mut orchestrator = ScanOrchestrator::new();

        let action = orchestrator.handle(&mut session, &outside("123"));
        assert_eq!(action, Some(OrchestratorAction::Ignored));
        assert_eq!(session.state(), CaptureState::Running);
    }

    #[test]
    fn test_at_most_one_forward_per_presentation() {
        let mut session = running_session(true);
        let mut orchestrator = ScanOrchestrator::new();

        let actions: Vec<_> = (0..5)
            .filter_map(|_| orchestrator.handle(&mut session, &inside("4006381333931")))
            .collect();

        assert_eq!(
            actions,
            vec![OrchestratorAction::Accepted("4006381333931".to_string())]
        );
        assert_eq!(session.state(), CaptureState::Paused);

        let stats = orchestrator.stats();
        assert_eq!(stats.seen, 5);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.discarded, 4);

        // Resuming re-arms detection.
        session.resume().unwrap();
        assert!(orchestrator
            .handle(&mut session, &inside("4006381333931"))
            .is_some());
    }

    #[test]
    fn test_detection_after_teardown_discarded() {
        let mut session = running_session(false);
        let mut orchestrator = ScanOrchestrator::new();
        session.teardown();

        assert_eq!(orchestrator.handle(&mut session, &inside("123")), None);
        assert_eq!(orchestrator.stats().discarded, 1);
    }
}
