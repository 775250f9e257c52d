//! Health, version, and stats endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::CacheStats;
use crate::db::store::StoreStats;
use crate::routes::api::json_response;
use crate::server::AppState;

/// Combined service statistics
#[derive(Debug, Serialize)]
struct StatsResponse {
    status: bool,
    cache: CacheStats,
    store: StoreStats,
    store_connected: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    name: &'static str,
    version: &'static str,
}

/// Handle `GET /api/stats`
pub async fn handle_stats(state: Arc<AppState>) -> Response<Full<Bytes>> {
    // Store stats degrade to zeros when persistence is down
    let store = match &state.store {
        Some(store) => store.stats().await,
        None => StoreStats::default(),
    };

    let body = StatsResponse {
        status: true,
        cache: state.cache.stats(),
        store,
        store_connected: state.store.is_some(),
    };

    json_response(serde_json::to_vec(&body).unwrap_or_default())
}

/// Handle `GET /health`
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let body = HealthResponse {
        status: "ok",
        node_id: state.args.node_id.to_string(),
    };
    json_response(serde_json::to_vec(&body).unwrap_or_default())
}

/// Handle `GET /version`
pub fn version_info() -> Response<Full<Bytes>> {
    let body = VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    };
    json_response(serde_json::to_vec(&body).unwrap_or_default())
}
