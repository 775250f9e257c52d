//! Archway - media resolution and archival gateway

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archway::{
    archive::{ArchivalConfig, ArchivalPipeline, TelegramStore},
    cache::{spawn_cache_sweeper, TtlCache},
    config::Args,
    db::mongo::MongoClient,
    db::store::{MongoAssetStore, RecordStore},
    origin::{OriginClient, OriginConfig},
    resolver::AssetResolver,
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("archway={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Archway - Media Resolution Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Origin lookup: {}", args.origin_lookup_url);
    info!("Archival: {}", if args.telegram().is_some() { "enabled" } else { "disabled" });
    info!("Workers: {}", args.worker_count);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, continuing without): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let store: Option<Arc<dyn RecordStore>> = match &mongo {
        Some(mongo) => match MongoAssetStore::new(mongo).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                if args.dev_mode {
                    warn!("Record store init failed (dev mode, continuing without): {}", e);
                    None
                } else {
                    error!("Record store init failed: {}", e);
                    std::process::exit(1);
                }
            }
        },
        None => None,
    };

    // Shared resolution cache with periodic sweep
    let cache = Arc::new(TtlCache::new());
    spawn_cache_sweeper(Arc::clone(&cache), Duration::from_secs(args.cache_sweep_secs));

    let origin = Arc::new(OriginClient::new(
        Arc::clone(&cache),
        OriginConfig {
            lookup_url: args.origin_lookup_url.clone(),
            ..OriginConfig::default()
        },
    ));

    // Archival requires both a store (to re-read and update records) and
    // Telegram credentials
    let archiver = match (&store, args.telegram()) {
        (Some(store), Some((token, chat_id))) => {
            let telegram = TelegramStore::new(
                &args.telegram_api_base,
                &token,
                &chat_id,
                args.max_upload_bytes(),
            )?;
            let pipeline = ArchivalPipeline::new(
                ArchivalConfig {
                    worker_count: args.worker_count,
                    max_queue_size: args.archive_queue_size,
                },
                Arc::clone(store),
                Arc::new(telegram),
            );
            Some(Arc::new(pipeline))
        }
        (None, Some(_)) => {
            warn!("Archival disabled: no persistent store");
            None
        }
        _ => {
            info!("Archival disabled: Telegram credentials not configured");
            None
        }
    };

    let resolver = Arc::new(AssetResolver::new(
        store.clone(),
        Arc::clone(&cache),
        origin,
        archiver,
    ));

    let state = Arc::new(server::AppState {
        args,
        cache,
        store,
        resolver,
    });

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
