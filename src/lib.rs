//! Archway - media resolution gateway
//!
//! Archway resolves a public media URL into a playable asset through a
//! three-tier lookup chain (MongoDB record, in-process TTL cache, origin
//! service) and opportunistically archives resolved assets to a durable
//! store in the background.
//!
//! ## Services
//!
//! - **Resolver**: tiered info and download resolution
//! - **Origin**: endpoint selection, encrypted info fetch, candidate probing
//! - **Cache**: thread-safe TTL cache with hit/miss accounting
//! - **Archive**: bounded worker pool uploading resolved assets to the
//!   durable store, with per-(asset, kind) dedup
//! - **Db**: persistent asset records in MongoDB

pub mod archive;
pub mod cache;
pub mod config;
pub mod db;
pub mod origin;
pub mod resolver;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ArchwayError, MediaKind, Result};
