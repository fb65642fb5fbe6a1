//! Capture session state machine.
//!
//! The session is the only thing allowed to change [`CaptureState`]. Every
//! method either performs a legal transition or reports why it could not.

use super::camera::{CameraDevice, CameraFacing, DeviceError, FailureReason};
use super::permission::PermissionStatus;
use crate::geometry::{PinchTracker, TargetFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Uninitialized,
    AwaitingPermission,
    PermissionDenied,
    Ready,
    Running,
    Paused,
    Failed(FailureReason),
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::AwaitingPermission => f.write_str("awaiting_permission"),
            Self::PermissionDenied => f.write_str("permission_denied"),
            Self::Ready => f.write_str("ready"),
            Self::Running => f.write_str("running"),
            Self::Paused => f.write_str("paused"),
            Self::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// Errors reported by capture operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("capture session failed ({reason}): {source}")]
    SessionFailed {
        reason: FailureReason,
        #[source]
        source: DeviceError,
    },
    #[error("{action} requires a running session (state: {state})")]
    NotRunning {
        action: &'static str,
        state: CaptureState,
    },
    #[error("cannot {action} from state {state}")]
    InvalidTransition {
        action: &'static str,
        state: CaptureState,
    },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("capture session was torn down")]
    TornDown,
    #[error("scanner service is not running")]
    ServiceClosed,
}

impl CaptureError {
    /// Returns true for failures that leave the session usable.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NotRunning { .. } | Self::Device(_))
    }
}

/// Where `start` left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStep {
    Running,
    /// Waiting on the platform permission prompt.
    AwaitingPermission,
}

/// Why a running session was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCause {
    /// The caller asked for it, e.g. the view left the foreground.
    Requested,
    /// A detection was accepted; only `resume` re-arms detection.
    Accepted,
}

/// Owns the camera device and the session state.
pub struct CaptureSession {
    device: Box<dyn CameraDevice>,
    state: CaptureState,
    target_frame: Option<TargetFrame>,
    gating_enabled: bool,
    facing: CameraFacing,
    pinch: PinchTracker,
    requested_zoom: Option<f64>,
    /// Bumped on every teardown so stale callbacks can be recognised.
    epoch: u64,
}

impl CaptureSession {
    pub fn new(device: Box<dyn CameraDevice>, facing: CameraFacing) -> Self {
        Self {
            device,
            state: CaptureState::Uninitialized,
            target_frame: None,
            gating_enabled: true,
            facing,
            pinch: PinchTracker::new(),
            requested_zoom: None,
            epoch: 0,
        }
    }

    /// Sets whether acceptance is restricted to the target frame before the
    /// first `start`.
    pub fn with_gating_enabled(mut self, enabled: bool) -> Self {
        self.gating_enabled = enabled;
        self
    }

    /// Starts a session given the permission status reported by the platform.
    ///
    /// Only valid from `Uninitialized`. Returns `AwaitingPermission` when the
    /// caller must prompt and then call [`resolve_permission`](Self::resolve_permission).
    pub fn start(
        &mut self,
        target_frame: TargetFrame,
        gating_enabled: bool,
        permission: PermissionStatus,
    ) -> Result<StartStep, CaptureError> {
        if self.state != CaptureState::Uninitialized {
            return Err(CaptureError::InvalidTransition {
                action: "start session",
                state: self.state,
            });
        }

        self.target_frame = Some(target_frame);
        self.gating_enabled = gating_enabled;

        match permission {
            PermissionStatus::Authorized => {
                self.transition(CaptureState::Ready);
                self.attach()?;
                Ok(StartStep::Running)
            }
            PermissionStatus::NotDetermined => {
                self.transition(CaptureState::AwaitingPermission);
                Ok(StartStep::AwaitingPermission)
            }
            PermissionStatus::Denied | PermissionStatus::Restricted => {
                tracing::warn!(?permission, "Camera permission not granted");
                self.transition(CaptureState::PermissionDenied);
                Err(CaptureError::PermissionDenied)
            }
        }
    }

    /// Applies the user's answer to the permission prompt.
    pub fn resolve_permission(&mut self, granted: bool) -> Result<(), CaptureError> {
        if self.state != CaptureState::AwaitingPermission {
            return Err(CaptureError::InvalidTransition {
                action: "resolve permission",
                state: self.state,
            });
        }

        if granted {
            self.transition(CaptureState::Ready);
            self.attach()
        } else {
            self.transition(CaptureState::PermissionDenied);
            Err(CaptureError::PermissionDenied)
        }
    }

    fn attach(&mut self) -> Result<(), CaptureError> {
        let attached = self
            .device
            .open(self.facing)
            .and_then(|()| self.device.attach_output());

        match attached {
            Ok(()) => {
                self.device.start();
                self.transition(CaptureState::Running);
                Ok(())
            }
            Err(source) => {
                // open/attach_output only produce session-fatal errors.
                let reason = source
                    .failure_reason()
                    .unwrap_or(FailureReason::InputAttachFailed);
                tracing::error!(%reason, error = %source, "Capture pipeline attach failed");
                self.device.release();
                self.transition(CaptureState::Failed(reason));
                Err(CaptureError::SessionFailed { reason, source })
            }
        }
    }

    /// Pauses a running session. Returns false if it was not running.
    pub fn pause(&mut self, cause: PauseCause) -> bool {
        if self.state != CaptureState::Running {
            tracing::debug!(state = %self.state, ?cause, "Pause ignored");
            return false;
        }
        self.device.stop();
        self.pinch.end();
        self.transition(CaptureState::Paused);
        tracing::debug!(?cause, "Capture paused");
        true
    }

    /// Resumes a paused session and re-arms detection.
    ///
    /// Resuming a running session is a no-op.
    pub fn resume(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Paused => {
                self.device.start();
                self.transition(CaptureState::Running);
                Ok(())
            }
            CaptureState::Running => Ok(()),
            state => Err(CaptureError::InvalidTransition {
                action: "resume",
                state,
            }),
        }
    }

    /// Releases the device and returns to `Uninitialized` from any state.
    pub fn teardown(&mut self) {
        self.device.release();
        self.pinch.end();
        self.requested_zoom = None;
        self.target_frame = None;
        self.epoch += 1;
        self.transition(CaptureState::Uninitialized);
    }

    /// Switches between the back and front camera.
    ///
    /// If the other camera cannot be opened the previous one is restored and
    /// the device error is reported.
    pub fn switch_facing(&mut self) -> Result<CameraFacing, CaptureError> {
        self.require_running("switch camera")?;

        let previous = self.facing;
        let next = previous.flipped();

        self.device.stop();
        self.pinch.end();
        let result = match self.device.open(next) {
            Ok(()) => {
                self.facing = next;
                tracing::info!(facing = %next, "Camera switched");
                Ok(next)
            }
            Err(err) => {
                tracing::warn!(facing = %next, error = %err, "Camera switch failed");
                if let Err(restore) = self.device.open(previous) {
                    let reason = restore
                        .failure_reason()
                        .unwrap_or(FailureReason::InputAttachFailed);
                    self.device.release();
                    self.transition(CaptureState::Failed(reason));
                    return Err(CaptureError::SessionFailed {
                        reason,
                        source: restore,
                    });
                }
                Err(CaptureError::Device(err))
            }
        };
        self.requested_zoom = None;
        self.device.start();
        result
    }

    /// Toggles the torch. Returns the new torch state.
    pub fn toggle_torch(&mut self) -> Result<bool, CaptureError> {
        self.require_running("toggle torch")?;

        if !self.device.has_torch() {
            return Err(DeviceError::TorchUnavailable.into());
        }
        let on = !self.device.torch_on();
        self.device.set_torch(on)?;
        tracing::debug!(on, "Torch toggled");
        Ok(on)
    }

    pub fn set_gating_enabled(&mut self, enabled: bool) {
        self.gating_enabled = enabled;
        tracing::debug!(enabled, "Frame gating changed");
    }

    /// Captures the current device zoom as the gesture baseline.
    pub fn begin_pinch(&mut self) -> Result<(), CaptureError> {
        self.require_running("zoom")?;
        self.pinch.begin(self.device.zoom_factor());
        Ok(())
    }

    /// Computes and applies the zoom for a pinch gesture's cumulative scale.
    ///
    /// The computed factor is recorded as the requested zoom even when the
    /// device refuses it.
    pub fn apply_pinch(&mut self, gesture_scale: f64) -> Result<f64, CaptureError> {
        self.require_running("zoom")?;

        let zoom = self.pinch.update(
            gesture_scale,
            self.device.zoom_factor(),
            self.device.zoom_bounds(),
        );
        self.requested_zoom = Some(zoom);

        if let Err(err) = self.device.set_zoom(zoom) {
            tracing::warn!(zoom, error = %err, "Zoom not applied");
            return Err(err.into());
        }
        Ok(zoom)
    }

    pub fn end_pinch(&mut self) {
        self.pinch.end();
    }

    /// Returns true if a detection may be processed right now.
    pub fn admits_detections(&self) -> bool {
        self.state == CaptureState::Running
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn target_frame(&self) -> Option<&TargetFrame> {
        self.target_frame.as_ref()
    }

    pub fn gating_enabled(&self) -> bool {
        self.gating_enabled
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn requested_zoom(&self) -> Option<f64> {
        self.requested_zoom
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn device(&self) -> &dyn CameraDevice {
        self.device.as_ref()
    }

    fn require_running(&self, action: &'static str) -> Result<(), CaptureError> {
        if self.state == CaptureState::Running {
            Ok(())
        } else {
            tracing::debug!(action, state = %self.state, "Action requires a running session");
            Err(CaptureError::NotRunning {
                action,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: CaptureState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "Capture state changed");
        }
        self.state = next;
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state)
            .field("facing", &self.facing)
            .field("gating_enabled", &self.gating_enabled)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCameraDevice;
    use crate::geometry::{Rect, ZoomBounds};

    fn frame() -> TargetFrame {
        TargetFrame::new(Rect::new(100.0, 100.0, 300.0, 200.0))
    }

    fn session_with(device: MockCameraDevice) -> CaptureSession {
        CaptureSession::new(Box::new(device), CameraFacing::Back)
    }

    fn running_session() -> CaptureSession {
        let mut session = session_with(MockCameraDevice::new());
        session
            .start(frame(), true, PermissionStatus::Authorized)
            .unwrap();
        session
    }

    #[test]
    fn test_authorized_start_runs() {
        let session = running_session();
        assert_eq!(session.state(), CaptureState::Running);
        assert!(session.device().is_running());
        assert!(session.admits_detections());
    }

    #[test]
    fn test_undetermined_permission_waits() {
        let mut session = session_with(MockCameraDevice::new());
        let step = session
            .start(frame(), true, PermissionStatus::NotDetermined)
            .unwrap();
        assert_eq!(step, StartStep::AwaitingPermission);
        assert_eq!(session.state(), CaptureState::AwaitingPermission);

        session.resolve_permission(true).unwrap();
        assert_eq!(session.state(), CaptureState::Running);
    }

    #[test]
    fn test_permission_refused_is_terminal() {
        let mut session = session_with(MockCameraDevice::new());
        session
            .start(frame(), true, PermissionStatus::NotDetermined)
            .unwrap();
        assert_eq!(
            session.resolve_permission(false),
            Err(CaptureError::PermissionDenied)
        );
        assert_eq!(session.state(), CaptureState::PermissionDenied);
        assert!(session.resume().is_err());
    }

    #[test]
    fn test_restricted_permission_denied() {
        let mut session = session_with(MockCameraDevice::new());
        let result = session.start(frame(), true, PermissionStatus::Restricted);
        assert_eq!(result, Err(CaptureError::PermissionDenied));
        assert_eq!(session.state(), CaptureState::PermissionDenied);
    }

    #[test]
    fn test_attach_failures_map_to_reasons() {
        let cases = [
            (
                MockCameraDevice::new().without_facing(CameraFacing::Back),
                FailureReason::NoDevice,
            ),
            (
                MockCameraDevice::new().failing_input(),
                FailureReason::InputAttachFailed,
            ),
            (
                MockCameraDevice::new().failing_output(),
                FailureReason::OutputAttachFailed,
            ),
        ];

        for (device, reason) in cases {
            let mut session = session_with(device);
            let err = session
                .start(frame(), true, PermissionStatus::Authorized)
                .unwrap_err();
            assert!(matches!(err, CaptureError::SessionFailed { reason: r, .. } if r == reason));
            assert_eq!(session.state(), CaptureState::Failed(reason));
        }
    }

    #[test]
    fn test_pause_and_resume() {
        let mut session = running_session();
        assert!(session.pause(PauseCause::Accepted));
        assert_eq!(session.state(), CaptureState::Paused);
        assert!(!session.admits_detections());
        assert!(!session.pause(PauseCause::Requested));

        session.resume().unwrap();
        assert_eq!(session.state(), CaptureState::Running);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut session = running_session();
        let result = session.start(frame(), true, PermissionStatus::Authorized);
        assert!(matches!(result, Err(CaptureError::InvalidTransition { .. })));
    }

    #[test]
    fn test_teardown_from_running() {
        let mut session = running_session();
        let epoch = session.epoch();
        session.teardown();

        assert_eq!(session.state(), CaptureState::Uninitialized);
        assert!(!session.device().is_running());
        assert!(session.device().facing().is_none());
        assert_eq!(session.epoch(), epoch + 1);

        // A fresh start is allowed after teardown.
        session
            .start(frame(), false, PermissionStatus::Authorized)
            .unwrap();
        assert!(!session.gating_enabled());
    }

    #[test]
    fn test_switch_and_torch_require_running() {
        let mut session = running_session();
        session.pause(PauseCause::Requested);

        let err = session.switch_facing().unwrap_err();
        assert!(err.is_soft());
        assert!(matches!(err, CaptureError::NotRunning { .. }));
        assert!(matches!(
            session.toggle_torch(),
            Err(CaptureError::NotRunning { .. })
        ));
        assert_eq!(session.state(), CaptureState::Paused);
    }

    #[test]
    fn test_switch_facing_round_trip() {
        let mut session = running_session();
        assert_eq!(session.switch_facing().unwrap(), CameraFacing::Front);
        assert_eq!(session.device().facing(), Some(CameraFacing::Front));
        assert_eq!(session.switch_facing().unwrap(), CameraFacing::Back);
        assert!(session.device().is_running());
    }

    #[test]
    fn test_switch_to_missing_camera_restores_previous() {
        let mut session =
            session_with(MockCameraDevice::new().without_facing(CameraFacing::Front));
        session
            .start(frame(), true, PermissionStatus::Authorized)
            .unwrap();

        let err = session.switch_facing().unwrap_err();
        assert!(matches!(err, CaptureError::Device(DeviceError::NoDevice(_))));
        assert_eq!(session.state(), CaptureState::Running);
        assert_eq!(session.facing(), CameraFacing::Back);
        assert!(session.device().is_running());
    }

    #[test]
    fn test_torch_toggle_and_unavailable() {
        let mut session = running_session();
        assert!(session.toggle_torch().unwrap());
        assert!(!session.toggle_torch().unwrap());

        let mut no_torch = session_with(MockCameraDevice::new().without_torch());
        no_torch
            .start(frame(), true, PermissionStatus::Authorized)
            .unwrap();
        assert_eq!(
            no_torch.toggle_torch(),
            Err(CaptureError::Device(DeviceError::TorchUnavailable))
        );
        assert_eq!(no_torch.state(), CaptureState::Running);
    }

    #[test]
    fn test_pinch_applies_clamped_zoom() {
        let mut session = session_with(
            MockCameraDevice::new().with_zoom_bounds(ZoomBounds::new(1.0, 5.0)),
        );
        session
            .start(frame(), true, PermissionStatus::Authorized)
            .unwrap();

        session.begin_pinch().unwrap();
        assert_eq!(session.apply_pinch(2.0).unwrap(), 2.0);
        assert_eq!(session.apply_pinch(10.0).unwrap(), 5.0);
        session.end_pinch();

        session.begin_pinch().unwrap();
        assert_eq!(session.apply_pinch(0.5).unwrap(), 2.5);
        assert_eq!(session.device().zoom_factor(), 2.5);
    }

    #[test]
    fn test_zoom_failure_keeps_intent_and_running() {
        let mut session = session_with(MockCameraDevice::new().failing_zoom());
        session
            .start(frame(), true, PermissionStatus::Authorized)
            .unwrap();

        let err = session.apply_pinch(3.0).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Device(DeviceError::ZoomApplyFailed { .. })
        ));
        assert_eq!(session.requested_zoom(), Some(3.0));
        assert_eq!(session.state(), CaptureState::Running);
    }
}
