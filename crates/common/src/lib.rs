//! Shared types for the mapstream crates.

mod types;

pub use types::{AssetId, Range, SegmentCoord};

pub fn crate_info() -> &'static str {
    "mapstream-common v0.1.0"
}
