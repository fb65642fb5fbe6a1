//! Camera device abstraction for barcode capture.
//!
//! This module provides a trait-based abstraction over the platform camera
//! pipeline, allowing for both real devices and mock implementations for
//! testing. Symbol decoding itself belongs to the platform; the device only
//! needs to be opened, started, stopped and configured.

use crate::geometry::ZoomBounds;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which way the camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    /// Returns the opposite facing.
    pub fn flipped(self) -> Self {
        match self {
            Self::Back => Self::Front,
            Self::Front => Self::Back,
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Back => f.write_str("back"),
            Self::Front => f.write_str("front"),
        }
    }
}

/// Why a session could not reach `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoDevice,
    InputAttachFailed,
    OutputAttachFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => f.write_str("no_device"),
            Self::InputAttachFailed => f.write_str("input_attach_failed"),
            Self::OutputAttachFailed => f.write_str("output_attach_failed"),
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("no {0} camera available")]
    NoDevice(CameraFacing),
    #[error("failed to attach camera input: {0}")]
    InputAttachFailed(String),
    #[error("failed to attach metadata output: {0}")]
    OutputAttachFailed(String),
    #[error("failed to apply zoom factor {factor:.2}: {message}")]
    ZoomApplyFailed { factor: f64, message: String },
    #[error("torch not available on this device")]
    TorchUnavailable,
}

impl DeviceError {
    /// Returns the session failure reason for errors that end a session.
    ///
    /// Zoom and torch errors are not session-fatal and return `None`.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::NoDevice(_) => Some(FailureReason::NoDevice),
            Self::InputAttachFailed(_) => Some(FailureReason::InputAttachFailed),
            Self::OutputAttachFailed(_) => Some(FailureReason::OutputAttachFailed),
            Self::ZoomApplyFailed { .. } | Self::TorchUnavailable => None,
        }
    }
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between the platform capture pipeline
/// and mock implementations for testing.
pub trait CameraDevice: Send {
    /// Selects the device with the given facing and attaches it as input,
    /// replacing any current input.
    fn open(&mut self, facing: CameraFacing) -> Result<(), DeviceError>;

    /// Attaches the metadata output that delivers detections.
    fn attach_output(&mut self) -> Result<(), DeviceError>;

    /// Starts frame delivery.
    fn start(&mut self);

    /// Stops frame delivery without releasing the device.
    fn stop(&mut self);

    /// Stops and releases all device resources.
    fn release(&mut self);

    /// Returns the facing of the attached input, if any.
    fn facing(&self) -> Option<CameraFacing>;

    /// Returns true while frames are being delivered.
    fn is_running(&self) -> bool;

    /// Zoom range supported by the attached input.
    fn zoom_bounds(&self) -> ZoomBounds;

    /// Zoom factor currently in effect.
    fn zoom_factor(&self) -> f64;

    /// Applies a zoom factor. May fail if the device is busy or locked.
    fn set_zoom(&mut self, factor: f64) -> Result<(), DeviceError>;

    fn has_torch(&self) -> bool;

    fn torch_on(&self) -> bool;

    fn set_torch(&mut self, on: bool) -> Result<(), DeviceError>;
}

/// Mock camera for testing with configurable failures.
#[derive(Debug, Clone)]
pub struct MockCameraDevice {
    facings: Vec<CameraFacing>,
    attached: Option<CameraFacing>,
    output_attached: bool,
    running: bool,
    fail_input: bool,
    fail_output: bool,
    fail_zoom: bool,
    has_torch: bool,
    torch_on: bool,
    bounds: ZoomBounds,
    zoom: f64,
}

impl Default for MockCameraDevice {
    fn default() -> Self {
        Self {
            facings: vec![CameraFacing::Back, CameraFacing::Front],
            attached: None,
            output_attached: false,
            running: false,
            fail_input: false,
            fail_output: false,
            fail_zoom: false,
            has_torch: true,
            torch_on: false,
            bounds: ZoomBounds::new(1.0, 8.0),
            zoom: 1.0,
        }
    }
}

impl MockCameraDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a facing so opening it reports `NoDevice`.
    pub fn without_facing(mut self, facing: CameraFacing) -> Self {
        self.facings.retain(|f| *f != facing);
        self
    }

    pub fn failing_input(mut self) -> Self {
        self.fail_input = true;
        self
    }

    pub fn failing_output(mut self) -> Self {
        self.fail_output = true;
        self
    }

    pub fn failing_zoom(mut self) -> Self {
        self.fail_zoom = true;
        self
    }

    pub fn without_torch(mut self) -> Self {
        self.has_torch = false;
        self
    }

    pub fn with_zoom_bounds(mut self, bounds: ZoomBounds) -> Self {
        self.bounds = bounds;
        self.zoom = bounds.min;
        self
    }
}

impl CameraDevice for MockCameraDevice {
    fn open(&mut self, facing: CameraFacing) -> Result<(), DeviceError> {
        if !self.facings.contains(&facing) {
            return Err(DeviceError::NoDevice(facing));
        }
        if self.fail_input {
            return Err(DeviceError::InputAttachFailed(
                "mock input rejected".to_string(),
            ));
        }
        self.attached = Some(facing);
        self.zoom = self.bounds.min;
        self.torch_on = false;
        tracing::info!(%facing, "MockCameraDevice opened");
        Ok(())
    }

    fn attach_output(&mut self) -> Result<(), DeviceError> {
        if self.fail_output {
            return Err(DeviceError::OutputAttachFailed(
                "mock output rejected".to_string(),
            ));
        }
        self.output_attached = true;
        Ok(())
    }

    fn start(&mut self) {
        self.running = self.attached.is_some() && self.output_attached;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        self.running = false;
        self.attached = None;
        self.output_attached = false;
        self.torch_on = false;
        tracing::info!("MockCameraDevice released");
    }

    fn facing(&self) -> Option<CameraFacing> {
        self.attached
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn zoom_bounds(&self) -> ZoomBounds {
        self.bounds
    }

    fn zoom_factor(&self) -> f64 {
        self.zoom
    }

    fn set_zoom(&mut self, factor: f64) -> Result<(), DeviceError> {
        if self.fail_zoom {
            return Err(DeviceError::ZoomApplyFailed {
                factor,
                message: "device locked".to_string(),
            });
        }
        self.zoom = factor;
        Ok(())
    }

    fn has_torch(&self) -> bool {
        self.has_torch
    }

    fn torch_on(&self) -> bool {
        self.torch_on
    }

    fn set_torch(&mut self, on: bool) -> Result<(), DeviceError> {
        if !self.has_torch {
            return Err(DeviceError::TorchUnavailable);
        }
        self.torch_on = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCameraDevice::new();
        assert!(camera.facing().is_none());

        camera.open(CameraFacing::Back).unwrap();
        camera.attach_output().unwrap();
        camera.start();
        assert!(camera.is_running());
        assert_eq!(camera.facing(), Some(CameraFacing::Back));

        camera.release();
        assert!(!camera.is_running());
        assert!(camera.facing().is_none());
    }

    #[test]
    fn test_missing_facing_reports_no_device() {
        let mut camera = MockCameraDevice::new().without_facing(CameraFacing::Front);
        let err = camera.open(CameraFacing::Front).unwrap_err();
        assert_eq!(err.failure_reason(), Some(FailureReason::NoDevice));
    }

    #[test]
    fn test_torch_errors_are_not_session_fatal() {
        assert_eq!(DeviceError::TorchUnavailable.failure_reason(), None);
    }
}
