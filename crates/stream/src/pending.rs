use std::collections::{HashSet, VecDeque};

use mapstream_common::SegmentCoord;

/// Segments that left the active window but still hold their assets.
///
/// Front of the queue has been pending the longest and is evicted first.
/// A segment that returns to the window before its turn is simply removed,
/// which is what keeps segments oscillating at the window edge from thrashing.
#[derive(Debug, Default)]
pub struct PendingUnloadQueue {
    order: VecDeque<SegmentCoord>,
    members: HashSet<SegmentCoord>,
}

impl PendingUnloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue (`pending = true`) or cancel (`pending = false`) an unload.
    ///
    /// Queueing is idempotent. Returns whether the queue changed.
    pub fn set_pending_unload(&mut self, coord: SegmentCoord, pending: bool) -> bool {
        if pending {
            if !self.members.insert(coord) {
                return false;
            }
            self.order.push_back(coord);
            true
        } else {
            if !self.members.remove(&coord) {
                return false;
            }
            if let Some(pos) = self.order.iter().position(|c| *c == coord) {
                self.order.remove(pos);
            }
            true
        }
    }

    /// Take the segment that has been pending longest.
    pub fn pop_front(&mut self) -> Option<SegmentCoord> {
        let coord = self.order.pop_front()?;
        self.members.remove(&coord);
        Some(coord)
    }

    pub fn front(&self) -> Option<SegmentCoord> {
        self.order.front().copied()
    }

    pub fn contains(&self, coord: SegmentCoord) -> bool {
        self.members.contains(&coord)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = SegmentCoord> + '_ {
        self.order.iter().copied()
    }
}
