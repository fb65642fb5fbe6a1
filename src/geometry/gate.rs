//! Target-frame gate for barcode detections.

use super::rect::{Rect, TargetFrame};

/// Decides whether a detection at `region` may be processed.
///
/// With gating disabled every detection passes. With gating enabled the
/// detected region must lie entirely inside the target frame; a symbol that
/// only overlaps the frame edge is rejected so a neighbouring barcode is not
/// read by accident.
pub fn accepts(region: &Rect, frame: &TargetFrame, gating_enabled: bool) -> bool {
    if !gating_enabled {
        return true;
    }
    frame.rect().contains_rect(region)
}
