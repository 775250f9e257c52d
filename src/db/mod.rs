//! MongoDB persistence for asset records

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use store::{MongoAssetStore, RecordStore, StoreStats};
