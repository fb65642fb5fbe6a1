//! Rectangles shared between the preview and the detector output.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle.
///
/// Coordinates live in the space shared by the video preview and the
/// detector output. `width` and `height` are expected to be non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Returns the four corners: top-left, top-right, bottom-left, bottom-right.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x(), self.min_y()),
            (self.max_x(), self.min_y()),
            (self.min_x(), self.max_y()),
            (self.max_x(), self.max_y()),
        ]
    }

    /// Returns true if the point lies inside the rectangle, edges included.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x() && x <= self.max_x() && y >= self.min_y() && y <= self.max_y()
    }

    /// Returns true if every corner of `other` lies inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other
            .corners()
            .iter()
            .all(|&(x, y)| self.contains_point(x, y))
    }
}

/// The region of the live view a barcode must sit in when gating is on.
///
/// Fixed for the lifetime of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetFrame {
    rect: Rect,
}

impl TargetFrame {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }

    /// Builds a frame centred horizontally in a view of `view_width`,
    /// `top_offset` below the top edge.
    pub fn centered(view_width: f64, width: f64, height: f64, top_offset: f64) -> Self {
        let x = (view_width - width) / 2.0;
        Self::new(Rect::new(x, top_offset, width, height))
    }

    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Computes the overlay corner markers: one horizontal and one vertical
    /// segment of `length` at each corner, pointing inward.
    pub fn corner_markers(&self, length: f64) -> [CornerMarker; 4] {
        let r = &self.rect;
        let marker = |corner: Corner, x: f64, y: f64, dx: f64, dy: f64| CornerMarker {
            corner,
            origin: (x, y),
            horizontal_end: (x + dx * length, y),
            vertical_end: (x, y + dy * length),
        };

        [
            marker(Corner::TopLeft, r.min_x(), r.min_y(), 1.0, 1.0),
            marker(Corner::TopRight, r.max_x(), r.min_y(), -1.0, 1.0),
            marker(Corner::BottomLeft, r.min_x(), r.max_y(), 1.0, -1.0),
            marker(Corner::BottomRight, r.max_x(), r.max_y(), -1.0, -1.0),
        ]
    }
}

impl From<Rect> for TargetFrame {
    fn from(rect: Rect) -> Self {
        Self::new(rect)
    }
}

/// Which corner of the target frame a marker sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// An L-shaped overlay marker: two segments sharing `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerMarker {
    pub corner: Corner,
    pub origin: (f64, f64),
    pub horizontal_end: (f64, f64),
    pub vertical_end: (f64, f64),
}
