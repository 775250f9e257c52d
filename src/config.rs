//! Configuration for Archway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Archway - media resolution and archival gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "archway")]
#[command(about = "Tiered media resolution gateway with durable archival")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "archway")]
    pub mongodb_db: String,

    /// Origin endpoint-lookup URL
    #[arg(
        long,
        env = "ORIGIN_LOOKUP_URL",
        default_value = "https://media.savetube.me/api/random-cdn"
    )]
    pub origin_lookup_url: String,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_BASE", default_value = "https://api.telegram.org")]
    pub telegram_api_base: String,

    /// Telegram bot token; archival is disabled when unset
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat id uploads are sent to
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    /// Maximum upload size in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "50")]
    pub max_upload_mb: u64,

    /// Number of archival worker tasks
    #[arg(long, env = "WORKER_COUNT", default_value = "2")]
    pub worker_count: usize,

    /// Maximum queued archival jobs
    #[arg(long, env = "ARCHIVE_QUEUE_SIZE", default_value = "64")]
    pub archive_queue_size: usize,

    /// Cache sweep interval in seconds
    #[arg(long, env = "CACHE_SWEEP_SECS", default_value = "60")]
    pub cache_sweep_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable development mode (tolerates missing MongoDB)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl Args {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), String> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(_), None) => Err("TELEGRAM_CHAT_ID required when TELEGRAM_BOT_TOKEN is set".into()),
            (None, Some(_)) => Err("TELEGRAM_BOT_TOKEN required when TELEGRAM_CHAT_ID is set".into()),
            _ => Ok(()),
        }
    }

    /// Telegram credentials, when archival is configured
    pub fn telegram(&self) -> Option<(String, String)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Some((token.clone(), chat_id.clone())),
            _ => None,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}
