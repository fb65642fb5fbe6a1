//! Pure geometry: target-frame gating and pinch zoom.
//!
//! Nothing in this module holds state across detections or touches a
//! device. Every input produces a defined output.

mod gate;
mod rect;
mod zoom;

pub use gate::accepts;
pub use rect::{Corner, CornerMarker, Rect, TargetFrame};
pub use zoom::{compute_zoom, PinchTracker, ZoomBounds};
