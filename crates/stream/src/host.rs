use mapstream_assets::Asset;
use mapstream_common::AssetId;
use serde_json::Value;

/// Error type host callbacks report failures with.
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Capabilities the embedding application supplies to the loader.
///
/// The loader owns *when* assets exist; the host owns *what* they are.
pub trait AssetHost {
    type Asset: Asset;

    /// Called once while the map descriptor is parsed, with its root node,
    /// after the loader has read segment size, boundary and path scheme from it.
    fn apply_map_settings(&mut self, _root: &Value) -> Result<(), HostError> {
        Ok(())
    }

    /// Build the asset for `id` from its descriptor node. Called the first time
    /// any resident segment references `id`.
    fn construct(&mut self, id: AssetId, node: &Value) -> Result<Self::Asset, HostError>;

    /// Called exactly once right before an evicted asset is erased, so the
    /// host can drop outside registrations (renderer, physics) first.
    ///
    /// Not called by [`MapLoader::free_all_assets`](crate::MapLoader::free_all_assets).
    fn delete(&mut self, _id: AssetId, _asset: &Self::Asset) {}
}
