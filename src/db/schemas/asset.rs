//! Asset record schema
//!
//! One record per distinct asset, keyed by the asset identifier derived from
//! the input URL. Created on first successful resolution; the archival
//! pipeline later fills in per-kind durable fields via point updates.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;
use crate::types::MediaKind;

/// Collection name for asset records
pub const ASSET_COLLECTION: &str = "assets";

/// Resolved asset info as returned to callers and cached in memory.
///
/// `resolution_key` is the opaque origin token for download probing;
/// `asset_id` is derived from the input URL and independent of the origin
/// service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub title: String,
    pub duration_label: String,
    pub thumbnail_url: String,
    pub resolution_key: String,
    pub asset_id: String,
}

/// Asset document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AssetRecord {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable identifier derived from the source URL
    pub asset_id: String,

    /// The URL the asset was first resolved from
    pub source_url: String,

    pub title: String,
    pub duration_label: String,
    pub thumbnail_url: String,

    /// Origin-issued token for download-candidate probing
    pub resolution_key: String,

    /// Durable video upload, set once by the archival pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_durable_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_message_handle: Option<i64>,

    /// Durable audio upload, set once by the archival pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_durable_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_message_handle: Option<i64>,
}

impl AssetRecord {
    /// Create a record from freshly resolved info
    pub fn new(info: &AssetInfo, source_url: &str) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            asset_id: info.asset_id.clone(),
            source_url: source_url.to_string(),
            title: info.title.clone(),
            duration_label: info.duration_label.clone(),
            thumbnail_url: info.thumbnail_url.clone(),
            resolution_key: info.resolution_key.clone(),
            video_durable_url: None,
            video_quality: None,
            video_message_handle: None,
            audio_durable_url: None,
            audio_quality: None,
            audio_message_handle: None,
        }
    }

    /// The durable URL and quality for a kind, if archived
    pub fn durable_for(&self, kind: MediaKind) -> Option<(String, String)> {
        let (url, quality) = match kind {
            MediaKind::Video => (&self.video_durable_url, &self.video_quality),
            MediaKind::Audio => (&self.audio_durable_url, &self.audio_quality),
        };
        url.as_ref().map(|u| {
            (
                u.clone(),
                quality.clone().unwrap_or_else(|| "HD".to_string()),
            )
        })
    }

    /// Info view of this record
    pub fn info(&self) -> AssetInfo {
        AssetInfo {
            title: self.title.clone(),
            duration_label: self.duration_label.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            resolution_key: self.resolution_key.clone(),
            asset_id: self.asset_id.clone(),
        }
    }
}

impl IntoIndexes for AssetRecord {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "asset_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("asset_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Derive the stable asset identifier from a media URL.
///
/// Recognizes the watch, short-link, embed, and /v/ URL shapes. Returns
/// `None` for anything else; the identifier is whatever follows the marker
/// up to the next delimiter.
pub fn extract_asset_id(url: &str) -> Option<String> {
    const MARKERS: &[&str] = &[
        "youtube.com/watch?v=",
        "youtu.be/",
        "youtube.com/embed/",
        "youtube.com/v/",
    ];

    for marker in MARKERS {
        if let Some(pos) = url.find(marker) {
            let id: String = url[pos + marker.len()..]
                .chars()
                .take_while(|c| !matches!(c, '&' | '?' | '#' | '/'))
                .collect();
            if !id.is_empty() {
                return Some(id);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_asset_id_shapes() {
        assert_eq!(
            extract_asset_id("https://www.youtube.com/watch?v=abc123&t=10"),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_asset_id("https://youtu.be/abc123?si=xyz"),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_asset_id("https://www.youtube.com/embed/abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_asset_id("https://www.youtube.com/v/abc123#frag"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_extract_asset_id_rejects_unknown() {
        assert_eq!(extract_asset_id("https://example.com/watch?v=abc"), None);
        assert_eq!(extract_asset_id("https://youtu.be/"), None);
    }

    #[test]
    fn test_durable_for_per_kind() {
        let mut record = AssetRecord::default();
        assert!(record.durable_for(MediaKind::Video).is_none());

        record.video_durable_url = Some("https://durable/v".to_string());
        record.video_quality = Some("720".to_string());

        assert_eq!(
            record.durable_for(MediaKind::Video),
            Some(("https://durable/v".to_string(), "720".to_string()))
        );
        // The other kind's fields stay untouched
        assert!(record.durable_for(MediaKind::Audio).is_none());
    }

    #[test]
    fn test_indices_cover_asset_id() {
        let indices = AssetRecord::into_indices();
        assert_eq!(indices.len(), 1);
        assert!(indices[0].0.contains_key("asset_id"));
    }
}
