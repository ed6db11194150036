use std::collections::{BTreeSet, HashMap};

use mapstream_common::AssetId;

/// Bookkeeping failures in the reference count table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefCountError {
    /// A release was requested for an id nobody holds. The accounting is
    /// corrupt; callers must stop rather than continue.
    #[error("asset {0} released while unreferenced")]
    Unreferenced(AssetId),
}

/// Counts how many resident segments reference each asset.
///
/// Looked up by id, but also kept sorted by `(count, id)` so diagnostics can
/// list assets by how widely they are shared.
#[derive(Debug, Default)]
pub struct RefCountTable {
    by_id: HashMap<AssetId, u32>,
    by_count: BTreeSet<(u32, AssetId)>,
}

impl RefCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `id`, inserting it with a count of 1 if absent.
    pub fn incr_ref_count(&mut self, id: AssetId) -> u32 {
        let count = self.by_id.entry(id).or_insert(0);
        if *count > 0 {
            self.by_count.remove(&(*count, id));
        }
        *count += 1;
        self.by_count.insert((*count, id));
        *count
    }

    /// Drop a reference on `id`.
    ///
    /// Returns `true` when the count reached zero; the entry is then removed and
    /// the caller is responsible for freeing the asset.
    pub fn decr_ref_count(&mut self, id: AssetId) -> Result<bool, RefCountError> {
        let Some(count) = self.by_id.get_mut(&id) else {
            return Err(RefCountError::Unreferenced(id));
        };
        self.by_count.remove(&(*count, id));
        *count -= 1;
        if *count == 0 {
            self.by_id.remove(&id);
            return Ok(true);
        }
        self.by_count.insert((*count, id));
        Ok(false)
    }

    /// Current count, 0 if absent.
    pub fn ref_count(&self, id: AssetId) -> u32 {
        self.by_id.get(&id).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_count.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Entries ordered by ascending count, ties broken by id.
    pub fn by_ref_count(&self) -> impl DoubleEndedIterator<Item = (AssetId, u32)> + '_ {
        self.by_count.iter().map(|&(count, id)| (id, count))
    }

    /// The `n` most shared assets, highest count first.
    pub fn most_shared(&self, n: usize) -> Vec<(AssetId, u32)> {
        self.by_ref_count().rev().take(n).collect()
    }
}
