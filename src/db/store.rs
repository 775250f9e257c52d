//! Persistent record store
//!
//! The resolver and archival pipeline consume the store through the
//! `RecordStore` trait so tests can substitute an in-memory double.

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use serde::Serialize;
use tracing::warn;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{extract_asset_id, AssetRecord, ASSET_COLLECTION};
use crate::types::{MediaKind, Result};

/// Aggregate record counts for the stats endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_records: u64,
    pub records_with_durable_video: u64,
    pub records_with_durable_audio: u64,
}

/// Operations the resolution and archival paths need from persistence
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<AssetRecord>>;

    /// Find by URL, deriving the asset id internally
    async fn find_by_url(&self, url: &str) -> Result<Option<AssetRecord>>;

    /// Insert or replace the resolution fields of a record by asset id
    async fn upsert(&self, record: AssetRecord) -> Result<()>;

    /// Point-update the durable fields for one kind, leaving everything else
    /// (including the opposite kind's fields) untouched
    async fn set_durable(
        &self,
        asset_id: &str,
        kind: MediaKind,
        durable_url: &str,
        quality_label: &str,
        message_handle: i64,
    ) -> Result<()>;

    /// Aggregate counts. Never fails; degrades to zeroed counters when the
    /// store is unreachable.
    async fn stats(&self) -> StoreStats;
}

/// MongoDB-backed record store
pub struct MongoAssetStore {
    assets: MongoCollection<AssetRecord>,
}

impl MongoAssetStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let assets = mongo.collection::<AssetRecord>(ASSET_COLLECTION).await?;
        Ok(Self { assets })
    }
}

#[async_trait]
impl RecordStore for MongoAssetStore {
    async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<AssetRecord>> {
        self.assets.find_one(doc! { "asset_id": asset_id }).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<AssetRecord>> {
        match extract_asset_id(url) {
            Some(asset_id) => self.find_by_asset_id(&asset_id).await,
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: AssetRecord) -> Result<()> {
        let filter = doc! { "asset_id": &record.asset_id };
        let update = doc! {
            "$set": {
                "source_url": &record.source_url,
                "title": &record.title,
                "duration_label": &record.duration_label,
                "thumbnail_url": &record.thumbnail_url,
                "resolution_key": &record.resolution_key,
                "metadata.updated_at": DateTime::now(),
            },
            "$setOnInsert": {
                "asset_id": &record.asset_id,
                "metadata.is_deleted": false,
                "metadata.created_at": DateTime::now(),
            },
        };

        self.assets.upsert_one(filter, update).await?;
        Ok(())
    }

    async fn set_durable(
        &self,
        asset_id: &str,
        kind: MediaKind,
        durable_url: &str,
        quality_label: &str,
        message_handle: i64,
    ) -> Result<()> {
        let prefix = kind.as_str();
        let mut set = Document::new();
        set.insert(format!("{prefix}_durable_url"), durable_url);
        set.insert(format!("{prefix}_quality"), quality_label);
        set.insert(format!("{prefix}_message_handle"), message_handle);
        set.insert("metadata.updated_at", DateTime::now());

        self.assets
            .update_one(doc! { "asset_id": asset_id }, doc! { "$set": set })
            .await?;
        Ok(())
    }

    async fn stats(&self) -> StoreStats {
        let total = self.assets.count(doc! {}).await;
        let video = self
            .assets
            .count(doc! { "video_durable_url": { "$exists": true } })
            .await;
        let audio = self
            .assets
            .count(doc! { "audio_durable_url": { "$exists": true } })
            .await;

        match (total, video, audio) {
            (Ok(total_records), Ok(with_video), Ok(with_audio)) => StoreStats {
                total_records,
                records_with_durable_video: with_video,
                records_with_durable_audio: with_audio,
            },
            _ => {
                warn!("Record store unreachable, reporting zeroed stats");
                StoreStats::default()
            }
        }
    }
}

/// In-memory store double for tests
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// HashMap-backed `RecordStore` that counts lookups and updates
    #[derive(Default)]
    pub struct MemoryRecordStore {
        records: Mutex<HashMap<String, AssetRecord>>,
        pub find_calls: AtomicUsize,
        pub durable_writes: AtomicUsize,
    }

    impl MemoryRecordStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_record(record: AssetRecord) -> Self {
            let store = Self::new();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.asset_id.clone(), record);
            store
        }

        pub fn get(&self, asset_id: &str) -> Option<AssetRecord> {
            self.records.lock().unwrap().get(asset_id).cloned()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryRecordStore {
        async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<AssetRecord>> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().unwrap().get(asset_id).cloned())
        }

        async fn find_by_url(&self, url: &str) -> Result<Option<AssetRecord>> {
            match extract_asset_id(url) {
                Some(id) => self.find_by_asset_id(&id).await,
                None => Ok(None),
            }
        }

        async fn upsert(&self, record: AssetRecord) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            match records.get_mut(&record.asset_id) {
                Some(existing) => {
                    existing.source_url = record.source_url;
                    existing.title = record.title;
                    existing.duration_label = record.duration_label;
                    existing.thumbnail_url = record.thumbnail_url;
                    existing.resolution_key = record.resolution_key;
                }
                None => {
                    records.insert(record.asset_id.clone(), record);
                }
            }
            Ok(())
        }

        async fn set_durable(
            &self,
            asset_id: &str,
            kind: MediaKind,
            durable_url: &str,
            quality_label: &str,
            message_handle: i64,
        ) -> Result<()> {
            self.durable_writes.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            if let Some(record) = records.get_mut(asset_id) {
                match kind {
                    MediaKind::Video => {
                        record.video_durable_url = Some(durable_url.to_string());
                        record.video_quality = Some(quality_label.to_string());
                        record.video_message_handle = Some(message_handle);
                    }
                    MediaKind::Audio => {
                        record.audio_durable_url = Some(durable_url.to_string());
                        record.audio_quality = Some(quality_label.to_string());
                        record.audio_message_handle = Some(message_handle);
                    }
                }
            }
            Ok(())
        }

        async fn stats(&self) -> StoreStats {
            let records = self.records.lock().unwrap();
            StoreStats {
                total_records: records.len() as u64,
                records_with_durable_video: records
                    .values()
                    .filter(|r| r.video_durable_url.is_some())
                    .count() as u64,
                records_with_durable_audio: records
                    .values()
                    .filter(|r| r.audio_durable_url.is_some())
                    .count() as u64,
            }
        }
    }
}
