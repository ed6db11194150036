use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use glam::Vec2;
use mapstream_common::{AssetId, Range, SegmentCoord};

use crate::descriptor::PathScheme;

/// Residency of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SegmentState {
    /// No assets held. Every coordinate starts here.
    #[default]
    Unloaded,
    /// Inside the active window with all of its assets resident.
    Loaded,
    /// Left the active window; assets still resident until the eviction pass reaches it.
    PendingUnload,
}

impl SegmentState {
    /// Loaded or pending unload: the segment holds references on its assets.
    pub fn is_resident(self) -> bool {
        !matches!(self, SegmentState::Unloaded)
    }
}

/// Record for one visited coordinate. Never destroyed, only cycled through states.
#[derive(Debug, Clone)]
pub struct Segment {
    pub(crate) descriptor: PathBuf,
    pub(crate) asset_ids: Vec<AssetId>,
    pub(crate) state: SegmentState,
}

impl Segment {
    fn new(descriptor: PathBuf) -> Self {
        Self {
            descriptor,
            asset_ids: Vec::new(),
            state: SegmentState::Unloaded,
        }
    }

    /// Descriptor file this segment loads from.
    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Assets this segment holds a reference on, in descriptor order.
    pub fn asset_ids(&self) -> &[AssetId] {
        &self.asset_ids
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }
}

/// Coordinate-keyed segment records over an unbounded plane.
///
/// Records are keyed directly by coordinate, so the viewpoint can roam
/// arbitrarily far without re-anchoring or reallocating a dense array.
/// Resident coordinates are indexed separately so per-tick diffs do not
/// scan every visited record.
#[derive(Debug)]
pub struct SegmentGrid {
    segment_size: Vec2,
    scheme: PathScheme,
    segments: HashMap<SegmentCoord, Segment>,
    resident: BTreeSet<SegmentCoord>,
}

impl SegmentGrid {
    /// Create an empty grid. `segment_size` must be positive on both axes.
    pub fn new(segment_size: Vec2, scheme: PathScheme) -> Self {
        debug_assert!(
            segment_size.x > 0.0 && segment_size.y > 0.0,
            "segment_size must be positive"
        );
        Self {
            segment_size,
            scheme,
            segments: HashMap::new(),
            resident: BTreeSet::new(),
        }
    }

    pub fn segment_size(&self) -> Vec2 {
        self.segment_size
    }

    /// Convert a world position to the coordinate of the segment containing it.
    pub fn index_of(&self, pos: Vec2) -> SegmentCoord {
        let cell = (pos / self.segment_size).floor();
        SegmentCoord::new(cell.x as i32, cell.y as i32)
    }

    /// World-space rectangle covered by a segment.
    pub fn segment_bounds(&self, coord: SegmentCoord) -> Range {
        let origin = Vec2::new(coord.x as f32, coord.y as f32) * self.segment_size;
        Range::new(origin, self.segment_size)
    }

    /// Square neighbourhood of `center` clipped to `boundary`, row-major.
    pub fn window(&self, center: SegmentCoord, radius: i32, boundary: &Range) -> Vec<SegmentCoord> {
        let radius = radius.max(0);
        let mut result = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let (Some(x), Some(y)) = (center.x.checked_add(dx), center.y.checked_add(dy))
                else {
                    continue;
                };
                let coord = SegmentCoord::new(x, y);
                if self.segment_bounds(coord).overlaps(boundary) {
                    result.push(coord);
                }
            }
        }
        result
    }

    /// Segment record at `coord`, created in state `Unloaded` on first access.
    pub fn entry(&mut self, coord: SegmentCoord) -> &mut Segment {
        let scheme = &self.scheme;
        self.segments
            .entry(coord)
            .or_insert_with(|| Segment::new(scheme.path_for(coord)))
    }

    pub fn get(&self, coord: SegmentCoord) -> Option<&Segment> {
        self.segments.get(&coord)
    }

    /// State of `coord`; never-visited coordinates are `Unloaded`.
    pub fn state(&self, coord: SegmentCoord) -> SegmentState {
        self.segments
            .get(&coord)
            .map_or(SegmentState::Unloaded, |s| s.state)
    }

    /// Transition a segment, keeping the resident index in step.
    pub fn set_state(&mut self, coord: SegmentCoord, state: SegmentState) {
        self.entry(coord).state = state;
        if state.is_resident() {
            self.resident.insert(coord);
        } else {
            self.resident.remove(&coord);
        }
    }

    /// Resident coordinates in row-major order.
    pub fn resident(&self) -> impl Iterator<Item = SegmentCoord> + '_ {
        self.resident.iter().copied()
    }

    /// Resident coordinates currently in `state`.
    pub fn resident_in(&self, state: SegmentState) -> Vec<SegmentCoord> {
        self.resident
            .iter()
            .copied()
            .filter(|c| self.state(*c) == state)
            .collect()
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }
}
