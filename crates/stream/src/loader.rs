use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use glam::Vec2;
use mapstream_assets::{Asset, AssetStore};
use mapstream_common::{AssetId, Range, SegmentCoord};
use serde_json::Value;

use crate::budget::{StreamConfig, StreamStats};
use crate::descriptor::{self, DescriptorSource, FileSource, MapSettings};
use crate::error::LoaderError;
use crate::grid::{Segment, SegmentGrid, SegmentState};
use crate::host::AssetHost;
use crate::pending::PendingUnloadQueue;
use crate::refcount::RefCountTable;

/// Settings fixed when the map descriptor is parsed.
#[derive(Debug)]
struct MapState {
    boundary: Range,
    grid: SegmentGrid,
}

/// Streams map segments around a moving viewpoint within a memory budget.
///
/// Drive it by calling [`update`](Self::update) once per tick. Segments that
/// enter the active window are loaded; segments that leave it are queued for
/// unload and only evicted, oldest first, while tracked memory exceeds
/// [`StreamConfig::target_memory`]. Assets are shared between segments by id
/// and reference counted, so an asset lives exactly as long as some resident
/// segment references it.
///
/// Assets are handed out by id only. After eviction [`asset`](Self::asset)
/// returns `None`; a copy taken with [`clone_asset`](Self::clone_asset) lives
/// on outside this loader's accounting.
pub struct MapLoader<H: AssetHost, S: DescriptorSource = FileSource> {
    host: H,
    source: S,
    config: StreamConfig,
    map: Option<MapState>,
    assets: AssetStore<H::Asset>,
    refcounts: RefCountTable,
    pending: PendingUnloadQueue,
    memory_usage: usize,
    stats: StreamStats,
}

impl<H: AssetHost> MapLoader<H> {
    /// Loader reading descriptors from disk.
    pub fn new(host: H, config: StreamConfig) -> Self {
        Self::with_source(host, FileSource, config)
    }
}

impl<H: AssetHost, S: DescriptorSource> MapLoader<H, S> {
    pub fn with_source(host: H, source: S, config: StreamConfig) -> Self {
        Self {
            host,
            source,
            config,
            map: None,
            assets: AssetStore::new(),
            refcounts: RefCountTable::new(),
            pending: PendingUnloadQueue::new(),
            memory_usage: 0,
            stats: StreamStats::default(),
        }
    }

    /// Read the map descriptor and configure the segment grid.
    ///
    /// Parsing a second map first unloads every segment of the current one,
    /// with delete callbacks.
    pub fn parse_map_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoaderError> {
        let path = path.as_ref();
        let _span = tracing::info_span!("parse_map_file", path = %path.display()).entered();

        let (settings, root) = descriptor::read_map_settings(&self.source, path)?;
        if self.map.is_some() {
            tracing::debug!("replacing current map");
            self.unload_all_segments()?;
        }
        self.host
            .apply_map_settings(&root)
            .map_err(|source| LoaderError::Host { source })?;

        let MapSettings {
            segment_size,
            boundary,
            segments,
        } = settings;
        tracing::info!(
            ?segment_size,
            ?boundary,
            dir = %segments.dir.display(),
            "map loaded"
        );
        self.map = Some(MapState {
            boundary,
            grid: SegmentGrid::new(segment_size, segments),
        });
        Ok(())
    }

    /// Advance streaming for a viewpoint at `viewpoint`.
    ///
    /// A segment that fails to load is left unloaded and does not stop the
    /// rest of the tick; the first such failure is returned once scheduling
    /// and eviction have run. Fatal accounting errors abort immediately.
    pub fn update(&mut self, viewpoint: Vec2) -> Result<&StreamStats, LoaderError> {
        let _span = tracing::info_span!("stream_update").entered();
        let tick_start = Instant::now();
        self.stats = StreamStats::default();

        let window = {
            let map = self.map_state()?;
            let center = map.grid.index_of(viewpoint);
            map.grid
                .window(center, self.config.window_radius, &map.boundary)
        };
        let in_window: HashSet<SegmentCoord> = window.iter().copied().collect();

        let mut first_error = None;
        for &coord in &window {
            match self.segment_state(coord) {
                SegmentState::Unloaded => {
                    if let Err(err) = self.load_segment(coord) {
                        let err = err.in_segment(coord);
                        if err.is_fatal() {
                            tracing::error!(error = %err, "aborting stream update");
                            return Err(err);
                        }
                        tracing::warn!(%coord, error = %err, "segment load failed");
                        self.stats.segments_failed += 1;
                        first_error.get_or_insert(err);
                    }
                }
                SegmentState::PendingUnload => self.restore(coord),
                SegmentState::Loaded => {}
            }
        }

        let leaving: Vec<SegmentCoord> = self
            .map_state()?
            .grid
            .resident_in(SegmentState::Loaded)
            .into_iter()
            .filter(|c| !in_window.contains(c))
            .collect();
        for coord in leaving {
            self.schedule_unload(coord);
        }

        self.unload_segments()?;
        self.finish_stats(tick_start);

        tracing::trace!(
            loaded = self.stats.segments_loaded,
            scheduled = self.stats.segments_scheduled,
            restored = self.stats.segments_restored,
            evicted = self.stats.segments_evicted,
            memory = self.memory_usage,
            "stream update complete"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(&self.stats),
        }
    }

    /// Load one segment and take references on all of its assets.
    ///
    /// Atomic: on failure every reference taken for this segment is released
    /// again and the segment stays `Unloaded`. Loading a `Loaded` segment does
    /// nothing; loading a `PendingUnload` segment cancels its pending unload.
    pub fn load_segment(&mut self, coord: SegmentCoord) -> Result<(), LoaderError> {
        let (state, path) = {
            let segment = self.map_state_mut()?.grid.entry(coord);
            (segment.state, segment.descriptor.clone())
        };
        match state {
            SegmentState::Loaded => return Ok(()),
            SegmentState::PendingUnload => {
                self.restore(coord);
                return Ok(());
            }
            SegmentState::Unloaded => {}
        }

        let entries =
            descriptor::flatten_assets(&self.source, &path, self.config.max_include_depth)?;

        let mut acquired = Vec::with_capacity(entries.len());
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id) {
                continue;
            }
            if let Err(err) = self.acquire(entry.id, &entry.node) {
                tracing::debug!(%coord, asset = %entry.id, "rolling back partial segment load");
                for id in acquired.iter().rev() {
                    self.release(*id)?;
                }
                return Err(err);
            }
            acquired.push(entry.id);
        }

        tracing::debug!(%coord, assets = acquired.len(), "segment loaded");
        let grid = &mut self.map_state_mut()?.grid;
        grid.entry(coord).asset_ids = acquired;
        grid.set_state(coord, SegmentState::Loaded);
        self.stats.segments_loaded += 1;
        Ok(())
    }

    /// Evict pending segments, oldest first, until tracked memory is within
    /// budget or nothing is pending. Returns the number evicted.
    pub fn unload_segments(&mut self) -> Result<usize, LoaderError> {
        self.map_state()?;
        let mut evicted = 0;
        while self.memory_usage > self.config.target_memory {
            let Some(coord) = self.pending.pop_front() else {
                tracing::debug!(
                    usage = self.memory_usage,
                    target = self.config.target_memory,
                    "over budget with no pending segments"
                );
                break;
            };
            self.evict_segment(coord)?;
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Evict every resident segment through the normal path, delete callbacks included.
    pub fn unload_all_segments(&mut self) -> Result<(), LoaderError> {
        let resident: Vec<SegmentCoord> = self.resident_segments().collect();
        for coord in resident {
            self.pending.set_pending_unload(coord, false);
            self.evict_segment(coord)?;
        }
        Ok(())
    }

    /// Drop every asset at once.
    ///
    /// Clears the store, the reference counts and the pending queue, resets
    /// tracked memory to zero and marks resident segments `Unloaded`, so the
    /// next [`update`](Self::update) reloads the window from scratch.
    ///
    /// Unlike eviction this does **not** call [`AssetHost::delete`]; hosts
    /// that registered assets elsewhere must tear those registrations down
    /// themselves.
    pub fn free_all_assets(&mut self) -> Result<(), LoaderError> {
        let grid = &mut self.map_state_mut()?.grid;
        let resident: Vec<SegmentCoord> = grid.resident().collect();
        for &coord in &resident {
            grid.entry(coord).asset_ids.clear();
            grid.set_state(coord, SegmentState::Unloaded);
        }
        let freed = self.assets.len();
        self.assets.clear();
        self.refcounts.clear();
        self.pending.clear();
        self.memory_usage = 0;
        tracing::info!(
            segments = resident.len(),
            assets = freed,
            "freed all assets without delete callbacks"
        );
        Ok(())
    }

    pub fn map_boundary(&self) -> Result<Range, LoaderError> {
        Ok(self.map_state()?.boundary)
    }

    pub fn segment_size(&self) -> Result<Vec2, LoaderError> {
        Ok(self.map_state()?.grid.segment_size())
    }

    /// Coordinate of the segment containing `pos`.
    pub fn index_of(&self, pos: Vec2) -> Result<SegmentCoord, LoaderError> {
        Ok(self.map_state()?.grid.index_of(pos))
    }

    /// Record for `coord`, if it has ever been visited.
    pub fn segment(&self, coord: SegmentCoord) -> Option<&Segment> {
        self.map.as_ref()?.grid.get(coord)
    }

    pub fn segment_state(&self, coord: SegmentCoord) -> SegmentState {
        self.map
            .as_ref()
            .map_or(SegmentState::Unloaded, |m| m.grid.state(coord))
    }

    /// Loaded and pending-unload coordinates, row-major.
    pub fn resident_segments(&self) -> impl Iterator<Item = SegmentCoord> + '_ {
        self.map.iter().flat_map(|m| m.grid.resident())
    }

    /// Running total of resident asset sizes. O(1).
    pub fn memory_usage(&self) -> Result<usize, LoaderError> {
        self.map_state()?;
        Ok(self.memory_usage)
    }

    /// Full-scan sum of resident asset sizes; always equals [`memory_usage`](Self::memory_usage).
    pub fn recompute_memory_usage(&self) -> Result<usize, LoaderError> {
        self.map_state()?;
        Ok(self.assets.resident_bytes())
    }

    /// Resident asset by id; `None` once it has been evicted.
    pub fn asset(&self, id: AssetId) -> Option<&H::Asset> {
        self.assets.get(id)
    }

    /// Independent copy of a resident asset. The copy is not tracked: it
    /// survives eviction and does not count against the budget.
    pub fn clone_asset(&self, id: AssetId) -> Option<H::Asset>
    where
        H::Asset: Clone,
    {
        self.assets.clone_asset(id)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn asset_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.assets.ids()
    }

    pub fn ref_count(&self, id: AssetId) -> u32 {
        self.refcounts.ref_count(id)
    }

    pub fn ref_counts(&self) -> &RefCountTable {
        &self.refcounts
    }

    pub fn pending_unloads(&self) -> &PendingUnloadQueue {
        &self.pending
    }

    /// Statistics from the last update.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn map_state(&self) -> Result<&MapState, LoaderError> {
        self.map.as_ref().ok_or(LoaderError::NotInitialized)
    }

    fn map_state_mut(&mut self) -> Result<&mut MapState, LoaderError> {
        self.map.as_mut().ok_or(LoaderError::NotInitialized)
    }

    fn acquire(&mut self, id: AssetId, node: &Value) -> Result<(), LoaderError> {
        if !self.assets.contains(id) {
            let asset = self
                .host
                .construct(id, node)
                .map_err(|source| LoaderError::Factory { id, source })?;
            let size = asset.memory_size();
            self.assets.insert(id, asset);
            self.memory_usage += size;
            self.stats.assets_created += 1;
            tracing::trace!(%id, size, "asset constructed");
        }
        self.refcounts.incr_ref_count(id);
        Ok(())
    }

    fn release(&mut self, id: AssetId) -> Result<(), LoaderError> {
        let unreferenced = self
            .refcounts
            .decr_ref_count(id)
            .inspect_err(|err| tracing::error!(%err, "asset accounting corrupt"))?;
        if !unreferenced {
            return Ok(());
        }
        if let Some(asset) = self.assets.get(id) {
            self.host.delete(id, asset);
        }
        if let Some(asset) = self.assets.remove(id) {
            self.memory_usage = self.memory_usage.saturating_sub(asset.memory_size());
            self.stats.assets_freed += 1;
            tracing::trace!(%id, "asset freed");
        }
        Ok(())
    }

    fn schedule_unload(&mut self, coord: SegmentCoord) {
        if let Some(map) = self.map.as_mut() {
            self.pending.set_pending_unload(coord, true);
            map.grid.set_state(coord, SegmentState::PendingUnload);
            self.stats.segments_scheduled += 1;
            tracing::debug!(%coord, "segment pending unload");
        }
    }

    fn restore(&mut self, coord: SegmentCoord) {
        if let Some(map) = self.map.as_mut() {
            self.pending.set_pending_unload(coord, false);
            map.grid.set_state(coord, SegmentState::Loaded);
            self.stats.segments_restored += 1;
            tracing::debug!(%coord, "segment back in window");
        }
    }

    fn evict_segment(&mut self, coord: SegmentCoord) -> Result<(), LoaderError> {
        let ids = std::mem::take(&mut self.map_state_mut()?.grid.entry(coord).asset_ids);
        for &id in &ids {
            self.release(id)?;
        }
        self.map_state_mut()?
            .grid
            .set_state(coord, SegmentState::Unloaded);
        self.stats.segments_evicted += 1;
        tracing::debug!(%coord, assets = ids.len(), usage = self.memory_usage, "segment evicted");
        Ok(())
    }

    fn finish_stats(&mut self, tick_start: Instant) {
        self.stats.resident_segments = self
            .map
            .as_ref()
            .map_or(0, |m| m.grid.resident_count());
        self.stats.pending_unloads = self.pending.len();
        self.stats.resident_assets = self.assets.len();
        self.stats.memory_usage = self.memory_usage;
        self.stats.target_memory = self.config.target_memory;
        self.stats.update_time = tick_start.elapsed();
    }
}
