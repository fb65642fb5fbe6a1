//! Camera capture session and its platform collaborators.
//!
//! This module owns the capture lifecycle: permission acquisition, device
//! attachment, start/stop, camera switching, torch and zoom. The platform
//! pipeline is treated as a source of decoded symbols, not something this
//! crate decodes itself.

mod camera;
mod detection;
mod permission;
mod session;

pub use camera::{CameraDevice, CameraFacing, DeviceError, FailureReason, MockCameraDevice};
pub use detection::{DetectionEvent, Symbology};
pub use permission::{
    DeferredPermission, PermissionAuthority, PermissionPrompt, PermissionStatus, StaticPermission,
};
pub use session::{CaptureError, CaptureSession, CaptureState, PauseCause, StartStep};
