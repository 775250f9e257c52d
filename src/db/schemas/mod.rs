//! Document schemas for MongoDB collections

pub mod asset;
pub mod metadata;

pub use asset::{extract_asset_id, AssetInfo, AssetRecord, ASSET_COLLECTION};
pub use metadata::Metadata;
