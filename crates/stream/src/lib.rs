//! Streaming: segment addressing, shared asset lifetimes, budgeted eviction.
//!
//! A map is a grid of fixed-size segments, each described by its own
//! descriptor file listing the assets it needs. [`MapLoader`] keeps the
//! segments around a moving viewpoint resident, shares assets between
//! segments by id, and defers unloading until memory pressure demands it.
//!
//! # Invariants
//! - An asset is resident iff at least one `Loaded` or `PendingUnload`
//!   segment lists it; its reference count equals the number of such segments.
//! - Tracked memory always equals the summed size of resident assets.
//! - A coordinate is in the pending queue iff its segment is `PendingUnload`.
//! - Segment loads are atomic: a failed load leaves nothing behind.
//! - After an update, memory exceeds the target only if nothing is pending.

mod budget;
mod descriptor;
mod error;
mod grid;
mod host;
mod loader;
mod pending;
mod refcount;

pub use budget::{StreamConfig, StreamStats};
pub use descriptor::{
    flatten_assets, read_map_settings, AssetEntry, DescriptorError, DescriptorSource, FileSource,
    IncludeChain, MapSettings, MemorySource, ParseError, PathScheme,
};
pub use error::LoaderError;
pub use grid::{Segment, SegmentGrid, SegmentState};
pub use host::{AssetHost, HostError};
pub use loader::MapLoader;
pub use pending::PendingUnloadQueue;
pub use refcount::{RefCountError, RefCountTable};

pub use mapstream_assets::Asset;
pub use mapstream_common::{AssetId, Range, SegmentCoord};

pub fn crate_info() -> &'static str {
    "mapstream-stream v0.1.0"
}
