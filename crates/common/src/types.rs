use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer address of a fixed-size map segment.
///
/// The plane is unbounded in every direction, so both components are signed.
/// Ordering is row-major (`y` first, then `x`) for deterministic iteration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SegmentCoord {
    pub y: i32,
    pub x: i32,
}

impl SegmentCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for SegmentCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Stable key of a constructed asset, shared by every segment that references it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned world-space rectangle: origin at `position`, extending by `size`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Range {
    pub position: Vec2,
    pub size: Vec2,
}

impl Range {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self { position, size }
    }

    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(Vec2::new(x, y), Vec2::new(w, h))
    }

    /// Opposite corner of `position`.
    pub fn max(&self) -> Vec2 {
        self.position + self.size
    }

    /// True if the interiors intersect. Rectangles sharing only an edge do not overlap.
    pub fn overlaps(&self, other: &Range) -> bool {
        let (a_max, b_max) = (self.max(), other.max());
        self.position.x < b_max.x
            && other.position.x < a_max.x
            && self.position.y < b_max.y
            && other.position.y < a_max.y
    }
}
