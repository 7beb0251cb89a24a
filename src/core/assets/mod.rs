mod asset_index;

pub use asset_index::{index_path, AssetIndex, AssetManager, AssetObject, AssetSyncReport};
