//! Background archival of resolved downloads
//!
//! Origin download URLs expire; the archival pipeline copies each resolved
//! asset to durable storage exactly once per (asset, kind) pair so later
//! requests can skip the origin entirely.

pub mod pipeline;
pub mod telegram;

pub use pipeline::{ArchivalConfig, ArchivalPipeline, ArchiveJob};
pub use telegram::{DurableStore, TelegramStore, UploadReceipt};
