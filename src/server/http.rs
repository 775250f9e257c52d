//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one spawned task per connection. All
//! responses are fully buffered JSON, so the body type is `Full<Bytes>`
//! throughout.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::cache::{CachedValue, TtlCache};
use crate::config::Args;
use crate::db::store::RecordStore;
use crate::resolver::AssetResolver;
use crate::routes;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Shared resolution cache (endpoint, info, download URLs)
    pub cache: Arc<TtlCache<CachedValue>>,
    /// Persistent record store; `None` when running degraded without MongoDB
    pub store: Option<Arc<dyn RecordStore>>,
    pub resolver: Arc<AssetResolver>,
}

/// Run the HTTP server until the process is stopped
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Archway listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.store.is_none() {
        warn!("Running without persistent store; durable tier disabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        handle_request(Arc::clone(&state), addr, req)
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            routes::status::health_check(&state)
        }
        (&Method::GET, "/version") => routes::status::version_info(),
        (&Method::GET, "/api/stats") => routes::status::handle_stats(state).await,
        (&Method::POST, "/api/resolve") => routes::api::handle_resolve(req, state).await,
        (&Method::POST, "/api/download") => routes::api::handle_download(req, state).await,
        (&Method::GET, "/api/resolve") => {
            routes::api::handle_legacy_resolve(&query, state).await
        }
        (&Method::OPTIONS, _) => preflight_response(),
        _ => routes::api::error_response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
