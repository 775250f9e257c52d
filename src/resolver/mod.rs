//! Resolution orchestrator
//!
//! Ties the tiers together: persistent records first, then the in-process
//! cache, then the origin. Download resolution additionally prefers durable
//! copies and hands fresh origin URLs to the archival pipeline.
//!
//! The store is optional so the service can run degraded (cache + origin
//! only) when persistence is unavailable at startup.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::archive::{ArchivalPipeline, ArchiveJob};
use crate::cache::{CachedValue, TtlCache};
use crate::db::schemas::{extract_asset_id, AssetInfo, AssetRecord};
use crate::db::store::RecordStore;
use crate::origin::{candidate_order, decode_payload, OriginApi};
use crate::types::{ArchwayError, MediaKind, Result};

/// How long resolved info stays cached
const INFO_TTL: Duration = Duration::from_secs(3600);

/// How long a probed download URL stays cached; origin URLs expire, so this
/// stays well under their observed lifetime
const DOWNLOAD_TTL: Duration = Duration::from_secs(1800);

/// Where a resolved download URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSource {
    /// Durable archived copy; non-expiring
    Durable,
    /// Origin-issued URL, possibly served from cache; expiring
    Origin,
}

/// A usable download URL for one media kind
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub url: String,
    pub quality_label: String,
    pub source: DownloadSource,
}

/// Tiered asset resolver
pub struct AssetResolver {
    store: Option<Arc<dyn RecordStore>>,
    cache: Arc<TtlCache<CachedValue>>,
    origin: Arc<dyn OriginApi>,
    archiver: Option<Arc<ArchivalPipeline>>,
}

impl AssetResolver {
    pub fn new(
        store: Option<Arc<dyn RecordStore>>,
        cache: Arc<TtlCache<CachedValue>>,
        origin: Arc<dyn OriginApi>,
        archiver: Option<Arc<ArchivalPipeline>>,
    ) -> Self {
        Self {
            store,
            cache,
            origin,
            archiver,
        }
    }

    /// Resolve a media URL to asset info.
    ///
    /// Tier order: persistent record, then cache, then origin. A fresh origin
    /// resolution is written back to both lower tiers.
    pub async fn resolve(&self, url: &str) -> Result<AssetInfo> {
        let asset_id = extract_asset_id(url)
            .ok_or_else(|| ArchwayError::BadRequest("unrecognized media URL".into()))?;

        // Tier 1: persistent record. Store failures degrade to the next tier.
        if let Some(store) = &self.store {
            match store.find_by_asset_id(&asset_id).await {
                Ok(Some(record)) if !record.resolution_key.is_empty() => {
                    debug!(asset_id = %asset_id, "Resolved from persistent record");
                    return Ok(record.info());
                }
                Ok(_) => {}
                Err(e) => warn!(asset_id = %asset_id, "Record lookup failed: {}", e),
            }
        }

        // Tier 2: in-process cache
        let cache_key = info_cache_key(&asset_id);
        if let Some(CachedValue::Info(info)) = self.cache.get(&cache_key) {
            debug!(asset_id = %asset_id, "Resolved from cache");
            return Ok(info);
        }

        // Tier 3: origin
        let blob = self.origin.fetch_info(url).await?;
        let decoded = decode_payload(&blob)?;

        let info = AssetInfo {
            title: decoded.title,
            duration_label: decoded.duration_label,
            thumbnail_url: decoded.thumbnail_url,
            resolution_key: decoded.resolution_key,
            asset_id: asset_id.clone(),
        };

        info!(asset_id = %asset_id, title = %info.title, "Resolved from origin");

        // Write-back; a store failure must not fail the resolution
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert(AssetRecord::new(&info, url)).await {
                warn!(asset_id = %asset_id, "Record upsert failed: {}", e);
            }
        }
        self.cache
            .set(&cache_key, CachedValue::Info(info.clone()), INFO_TTL);

        Ok(info)
    }

    /// Resolve a download URL for one media kind.
    ///
    /// Tier order: durable archived copy, then cached origin URL, then
    /// candidate probing in priority order. A fresh probe win is cached and
    /// (when the asset is known) handed to the archival pipeline.
    pub async fn get_download(
        &self,
        resolution_key: &str,
        asset_id: Option<&str>,
        kind: MediaKind,
    ) -> Result<ResolvedDownload> {
        if resolution_key.is_empty() {
            return Err(ArchwayError::BadRequest("missing resolution key".into()));
        }

        // Tier 1: durable copy, when we know which asset this is
        if let (Some(asset_id), Some(store)) = (asset_id, &self.store) {
            match store.find_by_asset_id(asset_id).await {
                Ok(Some(record)) => {
                    if let Some((url, quality_label)) = record.durable_for(kind) {
                        debug!(asset_id = asset_id, kind = %kind, "Serving durable copy");
                        return Ok(ResolvedDownload {
                            url,
                            quality_label,
                            source: DownloadSource::Durable,
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(asset_id = asset_id, "Record lookup failed: {}", e),
            }
        }

        // Tier 2: cached origin URL
        let cache_key = kind.cache_key(resolution_key);
        if let Some(CachedValue::Download { url, quality_label }) = self.cache.get(&cache_key) {
            debug!(kind = %kind, "Serving cached download URL");
            return Ok(ResolvedDownload {
                url,
                quality_label,
                source: DownloadSource::Origin,
            });
        }

        // Tier 3: probe candidates in priority order, stopping at the first
        // available one
        for quality in candidate_order(kind) {
            let Some(candidate) = self
                .origin
                .probe_candidate(kind, quality, resolution_key)
                .await
            else {
                continue;
            };

            info!(kind = %kind, quality = quality, "Download candidate available");

            self.cache.set(
                &cache_key,
                CachedValue::Download {
                    url: candidate.url.clone(),
                    quality_label: candidate.quality_label.clone(),
                },
                DOWNLOAD_TTL,
            );

            if let (Some(asset_id), Some(archiver)) = (asset_id, &self.archiver) {
                archiver
                    .trigger(ArchiveJob {
                        asset_id: asset_id.to_string(),
                        kind,
                        source_url: candidate.url.clone(),
                        quality_label: candidate.quality_label.clone(),
                    })
                    .await;
            }

            return Ok(ResolvedDownload {
                url: candidate.url,
                quality_label: candidate.quality_label,
                source: DownloadSource::Origin,
            });
        }

        Err(ArchwayError::NoCandidate(format!(
            "no {} candidate available",
            kind
        )))
    }
}

/// Cache key for resolved info, derived from the asset id
fn info_cache_key(asset_id: &str) -> String {
    let digest = Sha256::digest(asset_id.as_bytes());
    format!("info_{}", hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::telegram::{DurableStore, UploadReceipt};
    use crate::archive::ArchivalConfig;
    use crate::db::store::memory::MemoryRecordStore;
    use crate::origin::{encrypt_fixture, DownloadCandidate};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Origin double with a fixed info blob and a set of available qualities
    struct FakeOrigin {
        info_blob: Option<String>,
        available: HashMap<String, String>,
        info_calls: AtomicUsize,
        probe_calls: AtomicUsize,
    }

    impl FakeOrigin {
        fn new(info_json: &str, available: &[(&str, &str)]) -> Self {
            Self {
                info_blob: Some(encrypt_fixture(info_json)),
                available: available
                    .iter()
                    .map(|(q, u)| (q.to_string(), u.to_string()))
                    .collect(),
                info_calls: AtomicUsize::new(0),
                probe_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OriginApi for FakeOrigin {
        async fn select_endpoint(&self) -> Result<String> {
            Ok("cdn.example".to_string())
        }

        async fn fetch_info(&self, _url: &str) -> Result<String> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            self.info_blob
                .clone()
                .ok_or_else(|| ArchwayError::OriginUnavailable("no info".into()))
        }

        async fn probe_candidate(
            &self,
            kind: MediaKind,
            quality: &str,
            _resolution_key: &str,
        ) -> Option<DownloadCandidate> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            self.available.get(quality).map(|url| DownloadCandidate {
                kind,
                quality_label: quality.to_string(),
                url: url.clone(),
            })
        }
    }

    struct NullUploader;

    #[async_trait]
    impl DurableStore for NullUploader {
        async fn upload(
            &self,
            _source_url: &str,
            _filename: &str,
            _caption: &str,
        ) -> Result<UploadReceipt> {
            Ok(UploadReceipt {
                durable_url: "https://durable.example/file".to_string(),
                message_handle: 1,
                file_handle: "F".to_string(),
            })
        }
    }

    const INFO_JSON: &str = r#"{
        "title": "Sample Clip",
        "durationLabel": "3:45",
        "thumbnail": "https://thumb.example/t.jpg",
        "key": "tok123"
    }"#;

    fn resolver_with(
        store: Option<Arc<MemoryRecordStore>>,
        origin: Arc<FakeOrigin>,
        archiver: Option<Arc<ArchivalPipeline>>,
    ) -> AssetResolver {
        AssetResolver::new(
            store.map(|s| s as Arc<dyn RecordStore>),
            Arc::new(TtlCache::new()),
            origin,
            archiver,
        )
    }

    #[tokio::test]
    async fn test_resolve_rejects_unrecognized_url() {
        let origin = Arc::new(FakeOrigin::new(INFO_JSON, &[]));
        let resolver = resolver_with(None, origin, None);

        let err = resolver.resolve("https://example.com/clip").await.unwrap_err();
        assert!(matches!(err, ArchwayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_resolve_fetches_once_then_hits_store() {
        let store = Arc::new(MemoryRecordStore::new());
        let origin = Arc::new(FakeOrigin::new(INFO_JSON, &[]));
        let resolver = resolver_with(Some(store.clone()), origin.clone(), None);

        let url = "https://youtu.be/abc123";
        let first = resolver.resolve(url).await.unwrap();
        assert_eq!(first.title, "Sample Clip");
        assert_eq!(first.resolution_key, "tok123");
        assert_eq!(first.asset_id, "abc123");
        assert_eq!(origin.info_calls.load(Ordering::SeqCst), 1);

        // The write-back landed
        assert!(store.get("abc123").is_some());

        // Second resolve is served by the record, not the origin
        let second = resolver.resolve(url).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(origin.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_uses_cache_without_store() {
        let origin = Arc::new(FakeOrigin::new(INFO_JSON, &[]));
        let resolver = resolver_with(None, origin.clone(), None);

        let url = "https://youtu.be/abc123";
        resolver.resolve(url).await.unwrap();
        resolver.resolve(url).await.unwrap();
        assert_eq!(origin.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_probes_in_priority_order() {
        // 1080 unavailable, 720 available: two probes, no more
        let origin = Arc::new(FakeOrigin::new(
            INFO_JSON,
            &[("720", "https://origin.example/720")],
        ));
        let resolver = resolver_with(None, origin.clone(), None);

        let download = resolver
            .get_download("tok123", None, MediaKind::Video)
            .await
            .unwrap();

        assert_eq!(download.url, "https://origin.example/720");
        assert_eq!(download.quality_label, "720");
        assert_eq!(download.source, DownloadSource::Origin);
        assert_eq!(origin.probe_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_download_cached_after_first_probe() {
        let origin = Arc::new(FakeOrigin::new(
            INFO_JSON,
            &[("1080", "https://origin.example/1080")],
        ));
        let resolver = resolver_with(None, origin.clone(), None);

        resolver
            .get_download("tok123", None, MediaKind::Video)
            .await
            .unwrap();
        resolver
            .get_download("tok123", None, MediaKind::Video)
            .await
            .unwrap();

        assert_eq!(origin.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_exhausted_candidates() {
        let origin = Arc::new(FakeOrigin::new(INFO_JSON, &[]));
        let resolver = resolver_with(None, origin.clone(), None);

        let err = resolver
            .get_download("tok123", None, MediaKind::Audio)
            .await
            .unwrap_err();

        assert!(matches!(err, ArchwayError::NoCandidate(_)));
        assert_eq!(
            origin.probe_calls.load(Ordering::SeqCst),
            candidate_order(MediaKind::Audio).len()
        );
    }

    #[tokio::test]
    async fn test_download_prefers_durable_copy() {
        let store = Arc::new(MemoryRecordStore::new());
        let origin = Arc::new(FakeOrigin::new(
            INFO_JSON,
            &[("1080", "https://origin.example/1080")],
        ));
        let resolver = resolver_with(Some(store.clone()), origin.clone(), None);

        resolver.resolve("https://youtu.be/abc123").await.unwrap();
        store
            .set_durable(
                "abc123",
                MediaKind::Video,
                "https://durable.example/v",
                "720",
                9,
            )
            .await
            .unwrap();

        let download = resolver
            .get_download("tok123", Some("abc123"), MediaKind::Video)
            .await
            .unwrap();

        assert_eq!(download.source, DownloadSource::Durable);
        assert_eq!(download.url, "https://durable.example/v");
        assert_eq!(download.quality_label, "720");
        // Durable hit never touches the origin
        assert_eq!(origin.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_win_triggers_archival() {
        let store = Arc::new(MemoryRecordStore::new());
        let origin = Arc::new(FakeOrigin::new(
            INFO_JSON,
            &[("1080", "https://origin.example/1080")],
        ));
        let archiver = Arc::new(ArchivalPipeline::new(
            ArchivalConfig::default(),
            store.clone() as Arc<dyn RecordStore>,
            Arc::new(NullUploader),
        ));
        let resolver = resolver_with(Some(store.clone()), origin, Some(archiver));

        resolver.resolve("https://youtu.be/abc123").await.unwrap();
        resolver
            .get_download("tok123", Some("abc123"), MediaKind::Video)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let record = store.get("abc123").unwrap();
        assert_eq!(
            record.video_durable_url.as_deref(),
            Some("https://durable.example/file")
        );
    }

    #[tokio::test]
    async fn test_download_rejects_empty_key() {
        let origin = Arc::new(FakeOrigin::new(INFO_JSON, &[]));
        let resolver = resolver_with(None, origin, None);

        let err = resolver
            .get_download("", None, MediaKind::Video)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchwayError::BadRequest(_)));
    }
}
