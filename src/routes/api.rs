//! Resolution and download API
//!
//! ## Routes
//!
//! - `POST /api/resolve` - Resolve a media URL to asset info
//! - `POST /api/download` - Resolve a download URL for one media kind
//! - `GET /api/resolve?url=...` - Legacy one-shot resolve + best video URL
//!
//! All responses are JSON with a `status` boolean; failures carry a
//! `message` and map the internal error to an HTTP status.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::schemas::AssetInfo;
use crate::resolver::{DownloadSource, ResolvedDownload};
use crate::server::AppState;
use crate::types::{ArchwayError, MediaKind};

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    /// Origin resolution key from a prior resolve
    key: String,
    /// Known asset id; enables the durable tier and archival
    asset_id: Option<String>,
    kind: MediaKind,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    status: bool,
    data: AssetInfo,
}

#[derive(Debug, Serialize)]
struct DownloadResponse {
    status: bool,
    data: DownloadData,
}

#[derive(Debug, Serialize)]
struct DownloadData {
    download_url: String,
    quality: String,
    kind: MediaKind,
    source: &'static str,
}

#[derive(Debug, Serialize)]
struct LegacyResolveResponse {
    status: bool,
    #[serde(flatten)]
    info: AssetInfo,
    download_url: String,
    quality: String,
}

#[derive(Debug, Serialize)]
struct ApiError {
    status: bool,
    message: String,
}

impl DownloadData {
    fn new(download: &ResolvedDownload, kind: MediaKind) -> Self {
        Self {
            download_url: download.url.clone(),
            quality: download.quality_label.clone(),
            kind,
            source: match download.source {
                DownloadSource::Durable => "durable",
                DownloadSource::Origin => "origin",
            },
        }
    }
}

/// Build a successful JSON response
pub fn json_response(data: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(data)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"status":false}"#)))
                .unwrap()
        })
}

/// Build a JSON error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ApiError {
        status: false,
        message: message.to_string(),
    };
    let body = serde_json::to_vec(&error).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"status":false}"#)))
                .unwrap()
        })
}

/// Map a resolution failure to an HTTP error response
fn failure_response(e: &ArchwayError) -> Response<Full<Bytes>> {
    warn!("Request failed: {}", e);
    error_response(e.status_code(), &e.to_string())
}

/// Parse query string into key-value map
fn parse_query_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), urlencoding_decode(value)))
        })
        .collect()
}

/// Minimal percent-decoding for query values
fn urlencoding_decode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        let hex: String = [h, l].iter().collect();
                        match u8::from_str_radix(&hex, 16) {
                            Ok(byte) => out.push(byte as char),
                            Err(_) => {
                                out.push('%');
                                out.push(h);
                                out.push(l);
                            }
                        }
                    }
                    _ => out.push('%'),
                }
            }
            '+' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

async fn read_json_body<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<Full<Bytes>>> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                &format!("failed to read request body: {}", e),
            ))
        }
    };

    serde_json::from_slice(&body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("invalid request body: {}", e),
        )
    })
}

/// Handle `POST /api/resolve`
pub async fn handle_resolve(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let request: ResolveRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(response) => return response,
    };

    debug!(url = %request.url, "Resolve request");

    match state.resolver.resolve(&request.url).await {
        Ok(info) => {
            let body = ResolveResponse { status: true, data: info };
            json_response(serde_json::to_vec(&body).unwrap_or_default())
        }
        Err(e) => failure_response(&e),
    }
}

/// Handle `POST /api/download`
pub async fn handle_download(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let request: DownloadRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(response) => return response,
    };

    debug!(kind = %request.kind, "Download request");

    let result = state
        .resolver
        .get_download(&request.key, request.asset_id.as_deref(), request.kind)
        .await;

    match result {
        Ok(download) => {
            let body = DownloadResponse {
                status: true,
                data: DownloadData::new(&download, request.kind),
            };
            json_response(serde_json::to_vec(&body).unwrap_or_default())
        }
        Err(e) => failure_response(&e),
    }
}

/// Handle legacy `GET /api/resolve?url=...`
///
/// One round trip for callers that only want the best available video:
/// resolves the URL, then immediately resolves a video download for it.
pub async fn handle_legacy_resolve(
    query: &str,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let params = parse_query_params(query);
    let url = match params.get("url") {
        Some(url) if !url.is_empty() => url.clone(),
        _ => return error_response(StatusCode::BAD_REQUEST, "missing url parameter"),
    };

    let info = match state.resolver.resolve(&url).await {
        Ok(info) => info,
        Err(e) => return failure_response(&e),
    };

    let download = match state
        .resolver
        .get_download(&info.resolution_key, Some(&info.asset_id), MediaKind::Video)
        .await
    {
        Ok(download) => download,
        Err(e) => return failure_response(&e),
    };

    let body = LegacyResolveResponse {
        status: true,
        info,
        download_url: download.url,
        quality: download.quality_label,
    };
    json_response(serde_json::to_vec(&body).unwrap_or_default())
}
