//! Pinch-to-zoom computation.

use serde::{Deserialize, Serialize};

/// Zoom range reported by the active camera device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
}

impl ZoomBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self { min: 1.0, max: 1.0 }
    }
}

/// Computes the zoom factor for a pinch gesture.
///
/// Returns `baseline * gesture_scale` clamped to `[min_zoom, max_zoom]`.
/// Never panics: an inverted range resolves to `max_zoom`, and a NaN
/// product resolves to `min_zoom`.
pub fn compute_zoom(baseline: f64, gesture_scale: f64, min_zoom: f64, max_zoom: f64) -> f64 {
    (baseline * gesture_scale).max(min_zoom).min(max_zoom)
}

/// Tracks the baseline of an in-progress pinch gesture.
///
/// The baseline is the zoom in effect when the gesture began and stays
/// fixed until the gesture ends, so every gesture continues from the current
/// zoom instead of jumping back to 1.0.
#[derive(Debug, Clone, Default)]
pub struct PinchTracker {
    baseline: Option<f64>,
}

impl PinchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a gesture at `current_zoom`.
    pub fn begin(&mut self, current_zoom: f64) {
        self.baseline = Some(current_zoom);
    }

    /// Returns true while a gesture is in progress.
    pub fn is_active(&self) -> bool {
        self.baseline.is_some()
    }

    /// Computes the requested zoom for the gesture's cumulative `scale`.
    ///
    /// Begins a gesture at `current_zoom` if none is active.
    pub fn update(&mut self, scale: f64, current_zoom: f64, bounds: ZoomBounds) -> f64 {
        let baseline = *self.baseline.get_or_insert(current_zoom);
        compute_zoom(baseline, scale, bounds.min, bounds.max)
    }

    pub fn end(&mut self) {
        self.baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamped_above_max() {
        assert_eq!(compute_zoom(2.0, 3.0, 1.0, 5.0), 5.0);
    }

    #[test]
    fn test_clamped_below_min() {
        assert_eq!(compute_zoom(2.0, 0.1, 1.0, 5.0), 1.0);
    }

    #[test]
    fn test_unclamped() {
        assert_eq!(compute_zoom(2.0, 1.5, 1.0, 5.0), 3.0);
    }

    #[test]
    fn test_nan_scale_resolves_to_min() {
        assert_eq!(compute_zoom(2.0, f64::NAN, 1.0, 5.0), 1.0);
    }

    #[test]
    fn test_baseline_held_for_whole_gesture() {
        let bounds = ZoomBounds::new(1.0, 10.0);
        let mut pinch = PinchTracker::new();

        pinch.begin(2.0);
        assert_eq!(pinch.update(1.5, 3.0, bounds), 3.0);
        // The device already moved to 3.0 but the baseline stays 2.0.
        assert_eq!(pinch.update(2.0, 3.0, bounds), 4.0);
        pinch.end();
        assert!(!pinch.is_active());

        // The next gesture starts from the zoom in effect now.
        assert_eq!(pinch.update(2.0, 4.0, bounds), 8.0);
        assert!(pinch.is_active());
    }

    proptest! {
        #[test]
        fn prop_result_within_bounds(
            baseline in 0.5f64..20.0,
            scale in 0.0f64..50.0,
            min in 0.5f64..5.0,
            span in 0.0f64..20.0,
        ) {
            let max = min + span;
            let zoom = compute_zoom(baseline, scale, min, max);
            prop_assert!(zoom >= min && zoom <= max);
        }
    }
}
