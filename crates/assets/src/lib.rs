//! Keyed storage of constructed map assets.
//!
//! The store is deliberately dumb: it owns asset values by [`AssetId`] and
//! offers insert, erase, lookup and clone-by-key. Lifetime decisions
//! (reference counting, eviction) belong to the streaming layer.

use mapstream_common::AssetId;
use std::collections::BTreeMap;

/// A constructed asset that can be accounted against a memory budget.
pub trait Asset {
    /// Bytes this asset occupies. Must not change while the asset is stored.
    fn memory_size(&self) -> usize;
}

/// Id-keyed asset registry.
///
/// Uses BTreeMap so that iteration order is deterministic.
#[derive(Debug, Clone)]
pub struct AssetStore<A> {
    assets: BTreeMap<AssetId, A>,
}

impl<A> Default for AssetStore<A> {
    fn default() -> Self {
        Self {
            assets: BTreeMap::new(),
        }
    }
}

impl<A> AssetStore<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an asset under `id`, returning the value it replaced.
    pub fn insert(&mut self, id: AssetId, asset: A) -> Option<A> {
        let replaced = self.assets.insert(id, asset);
        if replaced.is_some() {
            tracing::warn!(%id, "asset replaced in store");
        }
        replaced
    }

    /// Erase an asset and hand it back to the caller.
    pub fn remove(&mut self, id: AssetId) -> Option<A> {
        self.assets.remove(&id)
    }

    pub fn get(&self, id: AssetId) -> Option<&A> {
        self.assets.get(&id)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.contains_key(&id)
    }

    /// Drop every stored asset.
    pub fn clear(&mut self) {
        self.assets.clear();
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Stored ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.assets.keys().copied()
    }
}

impl<A: Clone> AssetStore<A> {
    /// Independent copy of a stored asset.
    pub fn clone_asset(&self, id: AssetId) -> Option<A> {
        self.assets.get(&id).cloned()
    }
}

impl<A: Asset> AssetStore<A> {
    /// Sum of `memory_size` over every stored asset. Full scan.
    pub fn resident_bytes(&self) -> usize {
        self.assets.values().map(Asset::memory_size).sum()
    }
}

pub fn crate_info() -> &'static str {
    "mapstream-assets v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Blob(usize);

    impl Asset for Blob {
        fn memory_size(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut store = AssetStore::new();
        assert!(store.insert(AssetId(1), Blob(10)).is_none());
        assert_eq!(store.get(AssetId(1)), Some(&Blob(10)));
        assert!(store.contains(AssetId(1)));
        assert!(store.get(AssetId(2)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_returns_replaced_value() {
        let mut store = AssetStore::new();
        store.insert(AssetId(1), Blob(10));
        assert_eq!(store.insert(AssetId(1), Blob(20)), Some(Blob(10)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_hands_back_asset() {
        let mut store = AssetStore::new();
        store.insert(AssetId(3), Blob(7));
        assert_eq!(store.remove(AssetId(3)), Some(Blob(7)));
        assert!(store.remove(AssetId(3)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clone_asset_is_independent() {
        let mut store = AssetStore::new();
        store.insert(AssetId(5), Blob(4));
        let copy = store.clone_asset(AssetId(5)).unwrap();
        store.remove(AssetId(5));
        assert_eq!(copy, Blob(4));
        assert!(store.clone_asset(AssetId(5)).is_none());
    }

    #[test]
    fn resident_bytes_sums_sizes() {
        let mut store = AssetStore::new();
        store.insert(AssetId(1), Blob(100));
        store.insert(AssetId(2), Blob(23));
        assert_eq!(store.resident_bytes(), 123);
        store.clear();
        assert_eq!(store.resident_bytes(), 0);
        assert_eq!(store.ids().count(), 0);
    }

    #[test]
    fn ids_are_sorted() {
        let mut store = AssetStore::new();
        store.insert(AssetId(9), Blob(1));
        store.insert(AssetId(2), Blob(1));
        store.insert(AssetId(5), Blob(1));
        let ids: Vec<_> = store.ids().collect();
        assert_eq!(ids, vec![AssetId(2), AssetId(5), AssetId(9)]);
    }
}
