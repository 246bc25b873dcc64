//! Label-space geometry
//!
//! Pixel coordinates with the origin at the top-left of the inspected
//! image, y increasing downward.

use serde::{Deserialize, Serialize};

/// A point in label pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Axis-aligned containment check: is `other` within `radius` of this
    /// point on both axes?
    pub fn within(&self, other: Point, radius: f64) -> bool {
        other.x >= self.x - radius
            && other.x <= self.x + radius
            && other.y >= self.y - radius
            && other.y <= self.y + radius
    }
}

/// An axis-aligned rectangle in label pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }
}
