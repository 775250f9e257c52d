//! Origin service client
//!
//! Talks to the untrusted, rate-limited origin backend:
//!
//! - endpoint selection via a lookup call (cached, retried with backoff)
//! - encrypted info fetch (single attempt, short timeout)
//! - download-candidate probing in fixed priority order
//!
//! Probing treats every non-success outcome, including network failure, as
//! "candidate not available" so the caller can continue down the priority
//! list. Only endpoint-selection exhaustion is a hard error.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CachedValue, TtlCache};
use crate::types::{ArchwayError, MediaKind, Result};

/// Video qualities in descending preference
const VIDEO_QUALITIES: &[&str] = &["1080", "720", "480", "360"];

/// Audio formats, bitrate preferred over named format
const AUDIO_FORMATS: &[&str] = &["320", "256", "192", "128", "mp3", "m4a"];

/// Cache key for the selected content-delivery endpoint
const ENDPOINT_CACHE_KEY: &str = "origin_endpoint";

/// Fixed candidate priority list for a media kind
pub fn candidate_order(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Video => VIDEO_QUALITIES,
        MediaKind::Audio => AUDIO_FORMATS,
    }
}

/// One quality/format option the origin offers for an asset. Ephemeral;
/// never persisted directly.
#[derive(Debug, Clone)]
pub struct DownloadCandidate {
    pub kind: MediaKind,
    pub quality_label: String,
    pub url: String,
}

/// Origin operations, behind a trait so the resolver can be exercised with
/// test doubles.
#[async_trait]
pub trait OriginApi: Send + Sync {
    /// Select a content-delivery endpoint (cached, retried)
    async fn select_endpoint(&self) -> Result<String>;

    /// Fetch the encrypted info blob for a media URL (single attempt)
    async fn fetch_info(&self, url: &str) -> Result<String>;

    /// Probe one download candidate. `None` means "not available"; probing
    /// failures are never hard errors.
    async fn probe_candidate(
        &self,
        kind: MediaKind,
        quality: &str,
        resolution_key: &str,
    ) -> Option<DownloadCandidate>;
}

/// Configuration for the origin client
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Endpoint lookup URL (returns the current CDN host)
    pub lookup_url: String,
    /// How long a selected endpoint stays cached
    pub endpoint_ttl: Duration,
    /// Lookup attempts before giving up
    pub lookup_attempts: u32,
    /// Delay between lookup attempts
    pub lookup_backoff: Duration,
    /// Timeout for the lookup call
    pub lookup_timeout: Duration,
    /// Timeout for the info fetch
    pub info_timeout: Duration,
    /// Timeout for a video candidate probe
    pub video_probe_timeout: Duration,
    /// Timeout for an audio candidate probe
    pub audio_probe_timeout: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            lookup_url: "https://media.savetube.me/api/random-cdn".to_string(),
            endpoint_ttl: Duration::from_secs(300),
            lookup_attempts: 3,
            lookup_backoff: Duration::from_millis(500),
            lookup_timeout: Duration::from_secs(3),
            info_timeout: Duration::from_secs(8),
            video_probe_timeout: Duration::from_secs(8),
            audio_probe_timeout: Duration::from_secs(6),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    cdn: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    status: bool,
    data: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeResponse {
    #[serde(default)]
    status: bool,
    data: Option<ProbeData>,
}

#[derive(Debug, Deserialize)]
struct ProbeData {
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
}

/// Production origin client over reqwest
pub struct OriginClient {
    http: reqwest::Client,
    cache: Arc<TtlCache<CachedValue>>,
    config: OriginConfig,
}

impl OriginClient {
    pub fn new(cache: Arc<TtlCache<CachedValue>>, config: OriginConfig) -> Self {
        // Pooled client shared by all origin calls; per-request timeouts
        // are applied at the call sites.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(20)
            .build()
            .unwrap_or_default();

        Self { http, cache, config }
    }

    fn probe_timeout(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Video => self.config.video_probe_timeout,
            MediaKind::Audio => self.config.audio_probe_timeout,
        }
    }
}

#[async_trait]
impl OriginApi for OriginClient {
    async fn select_endpoint(&self) -> Result<String> {
        if let Some(CachedValue::Endpoint(endpoint)) = self.cache.get(ENDPOINT_CACHE_KEY) {
            return Ok(endpoint);
        }

        for attempt in 1..=self.config.lookup_attempts {
            let result = self
                .http
                .get(&self.config.lookup_url)
                .timeout(self.config.lookup_timeout)
                .send()
                .await;

            match result {
                Ok(response) => match response.json::<LookupResponse>().await {
                    Ok(LookupResponse { cdn: Some(endpoint) }) if !endpoint.is_empty() => {
                        info!(endpoint = %endpoint, "Origin endpoint selected");
                        self.cache.set(
                            ENDPOINT_CACHE_KEY,
                            CachedValue::Endpoint(endpoint.clone()),
                            self.config.endpoint_ttl,
                        );
                        return Ok(endpoint);
                    }
                    Ok(_) => warn!(attempt = attempt, "Endpoint lookup returned no endpoint"),
                    Err(e) => warn!(attempt = attempt, error = %e, "Endpoint lookup body malformed"),
                },
                Err(e) => warn!(attempt = attempt, error = %e, "Endpoint lookup failed"),
            }

            tokio::time::sleep(self.config.lookup_backoff).await;
        }

        Err(ArchwayError::OriginUnavailable(format!(
            "endpoint lookup failed after {} attempts",
            self.config.lookup_attempts
        )))
    }

    async fn fetch_info(&self, url: &str) -> Result<String> {
        let endpoint = self.select_endpoint().await?;

        let response = self
            .http
            .post(format!("https://{endpoint}/v2/info"))
            .json(&serde_json::json!({ "url": url }))
            .timeout(self.config.info_timeout)
            .send()
            .await
            .map_err(|e| ArchwayError::Http(format!("info request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ArchwayError::OriginResponse(format!(
                "info request returned HTTP {}",
                response.status()
            )));
        }

        let body: InfoResponse = response
            .json()
            .await
            .map_err(|e| ArchwayError::OriginResponse(format!("malformed info body: {e}")))?;

        match body {
            InfoResponse { status: true, data: Some(blob), .. } => Ok(blob),
            InfoResponse { message, .. } => Err(ArchwayError::OriginResponse(
                message.unwrap_or_else(|| "origin rejected info request".to_string()),
            )),
        }
    }

    async fn probe_candidate(
        &self,
        kind: MediaKind,
        quality: &str,
        resolution_key: &str,
    ) -> Option<DownloadCandidate> {
        let endpoint = match self.select_endpoint().await {
            Ok(e) => e,
            Err(e) => {
                warn!(kind = %kind, quality = quality, error = %e, "Probe skipped, no endpoint");
                return None;
            }
        };

        let result = self
            .http
            .post(format!("https://{endpoint}/download"))
            .json(&serde_json::json!({
                "downloadType": kind.as_str(),
                "quality": quality,
                "key": resolution_key,
            }))
            .timeout(self.probe_timeout(kind))
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(kind = %kind, quality = quality, status = %r.status(), "Candidate probe rejected");
                return None;
            }
            Err(e) => {
                warn!(kind = %kind, quality = quality, error = %e, "Candidate probe failed");
                return None;
            }
        };

        match response.json::<ProbeResponse>().await {
            Ok(ProbeResponse { status: true, data: Some(ProbeData { download_url: Some(url) }) })
                if !url.is_empty() =>
            {
                Some(DownloadCandidate {
                    kind,
                    quality_label: quality.to_string(),
                    url,
                })
            }
            Ok(_) => {
                debug!(kind = %kind, quality = quality, "Candidate not available");
                None
            }
            Err(e) => {
                warn!(kind = %kind, quality = quality, error = %e, "Candidate probe body malformed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_priority_descending() {
        let order = candidate_order(MediaKind::Video);
        assert_eq!(order, &["1080", "720", "480", "360"]);
    }

    #[test]
    fn test_audio_bitrate_before_named_format() {
        let order = candidate_order(MediaKind::Audio);
        assert_eq!(order[0], "320");
        let mp3_pos = order.iter().position(|q| *q == "mp3").unwrap();
        let last_bitrate_pos = order.iter().position(|q| *q == "128").unwrap();
        assert!(mp3_pos > last_bitrate_pos);
    }

    #[test]
    fn test_probe_response_requires_url() {
        // Truthy status without a URL is "not available"
        let body: ProbeResponse =
            serde_json::from_str(r#"{"status": true, "data": {}}"#).unwrap();
        assert!(body.status);
        assert!(body.data.unwrap().download_url.is_none());
    }

    #[test]
    fn test_info_response_defaults_to_failure() {
        let body: InfoResponse = serde_json::from_str(r#"{"message": "rate limited"}"#).unwrap();
        assert!(!body.status);
        assert_eq!(body.message.as_deref(), Some("rate limited"));
    }
}
