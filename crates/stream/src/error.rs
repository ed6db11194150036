use mapstream_common::{AssetId, SegmentCoord};

use crate::descriptor::ParseError;
use crate::host::HostError;
use crate::refcount::RefCountError;

/// Errors from [`MapLoader`](crate::MapLoader) operations.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// An operation that needs map settings ran before `parse_map_file`.
    #[error("map loader not initialised; parse a map file first")]
    NotInitialized,
    #[error("failed to parse {0}")]
    Parse(#[from] ParseError),
    #[error("host failed to construct asset {id}: {source}")]
    Factory { id: AssetId, source: HostError },
    #[error("host rejected map settings: {source}")]
    Host { source: HostError },
    #[error("reference count invariant violated: {0}")]
    RefCount(#[from] RefCountError),
    #[error("failed to load segment {coord}: {source}")]
    Segment {
        coord: SegmentCoord,
        source: Box<LoaderError>,
    },
}

impl LoaderError {
    /// Corrupt accounting. The loader must not keep going after one of these.
    pub fn is_fatal(&self) -> bool {
        match self {
            LoaderError::RefCount(_) => true,
            LoaderError::Segment { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// The error beneath any segment tagging.
    pub fn root_cause(&self) -> &LoaderError {
        match self {
            LoaderError::Segment { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn in_segment(self, coord: SegmentCoord) -> Self {
        LoaderError::Segment {
            coord,
            source: Box::new(self),
        }
    }
}
