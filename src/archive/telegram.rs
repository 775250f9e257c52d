//! Durable storage backed by the Telegram Bot API
//!
//! Uploads are fetched from the (expiring) origin URL, pushed to a Telegram
//! chat as a video, audio, or document message, and the resulting file is
//! addressed through a stable bot-file URL.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{ArchwayError, Result};

/// Upload timeout, generous because media transfers dominate
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".avi"];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".m4a", ".aac"];

/// Result of a successful durable upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    /// Stable URL the file can be fetched from
    pub durable_url: String,
    /// Message identifier within the storage chat
    pub message_handle: i64,
    /// Storage-side file identifier
    pub file_handle: String,
}

/// Durable upload backend, behind a trait so the pipeline can be tested
/// without network access
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upload(&self, source_url: &str, filename: &str, caption: &str)
        -> Result<UploadReceipt>;
}

/// Telegram-backed durable store
pub struct TelegramStore {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    max_upload_bytes: u64,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<MessageResult>,
}

#[derive(Deserialize)]
struct MessageResult {
    message_id: i64,
    video: Option<FileRef>,
    audio: Option<FileRef>,
    document: Option<FileRef>,
}

#[derive(Deserialize)]
struct FileRef {
    file_id: String,
}

#[derive(Deserialize)]
struct GetFileResponse {
    ok: bool,
    result: Option<FilePath>,
}

#[derive(Deserialize)]
struct FilePath {
    file_path: String,
}

impl TelegramStore {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        chat_id: &str,
        max_upload_bytes: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| ArchwayError::Config(format!("Failed to build upload client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            max_upload_bytes,
        })
    }

    /// Pick the send method and multipart field name from the filename
    fn method_for(filename: &str) -> (&'static str, &'static str) {
        let lower = filename.to_lowercase();
        if VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            ("sendVideo", "video")
        } else if AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            ("sendAudio", "audio")
        } else {
            ("sendDocument", "document")
        }
    }

    /// Fetch the source media into memory, rejecting oversized files before
    /// and after the transfer
    async fn fetch_source(&self, source_url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(source_url)
            .send()
            .await
            .map_err(|e| ArchwayError::Archival(format!("Source fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ArchwayError::Archival(format!(
                "Source fetch returned HTTP {}",
                response.status()
            )));
        }

        // Declared size lets us fail before pulling the body
        if let Some(declared) = response.content_length() {
            if declared > self.max_upload_bytes {
                return Err(ArchwayError::Archival(format!(
                    "File too large for upload: {} bytes (limit {})",
                    declared, self.max_upload_bytes
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchwayError::Archival(format!("Source read failed: {}", e)))?;

        // Origins do not always declare Content-Length
        if bytes.len() as u64 > self.max_upload_bytes {
            return Err(ArchwayError::Archival(format!(
                "File too large for upload: {} bytes (limit {})",
                bytes.len(),
                self.max_upload_bytes
            )));
        }

        Ok(bytes.to_vec())
    }

    /// Resolve a file id to a stable bot-file URL
    async fn durable_url_for(&self, file_id: &str) -> Result<String> {
        let url = format!("{}/bot{}/getFile", self.api_base, self.bot_token);
        let response = self
            .http
            .get(&url)
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| ArchwayError::Archival(format!("getFile request failed: {}", e)))?;

        let parsed: GetFileResponse = response
            .json()
            .await
            .map_err(|e| ArchwayError::Archival(format!("getFile response malformed: {}", e)))?;

        let file_path = match parsed.result {
            Some(r) if parsed.ok => r.file_path,
            _ => return Err(ArchwayError::Archival("getFile returned no path".into())),
        };

        Ok(format!(
            "{}/file/bot{}/{}",
            self.api_base, self.bot_token, file_path
        ))
    }
}

#[async_trait]
impl DurableStore for TelegramStore {
    async fn upload(
        &self,
        source_url: &str,
        filename: &str,
        caption: &str,
    ) -> Result<UploadReceipt> {
        let bytes = self.fetch_source(source_url).await?;
        let (method, field) = Self::method_for(filename);

        debug!(
            filename,
            method,
            size = bytes.len(),
            "Uploading to durable storage"
        );

        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part(field, part);

        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ArchwayError::Archival(format!("Upload request failed: {}", e)))?;

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ArchwayError::Archival(format!("Upload response malformed: {}", e)))?;

        if !parsed.ok {
            return Err(ArchwayError::Archival(format!(
                "Upload rejected: {}",
                parsed.description.unwrap_or_else(|| "unknown error".into())
            )));
        }

        let message = parsed
            .result
            .ok_or_else(|| ArchwayError::Archival("Upload response missing result".into()))?;

        let file_id = message
            .video
            .or(message.audio)
            .or(message.document)
            .map(|f| f.file_id)
            .ok_or_else(|| ArchwayError::Archival("Upload response missing file id".into()))?;

        let durable_url = self.durable_url_for(&file_id).await?;

        info!(filename, message_id = message.message_id, "Durable upload complete");

        Ok(UploadReceipt {
            durable_url,
            message_handle: message.message_id,
            file_handle: file_id,
        })
    }
}
