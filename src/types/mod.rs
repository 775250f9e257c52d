//! Shared types for Archway

pub mod error;
pub mod media;

pub use error::{ArchwayError, Result};
pub use media::MediaKind;
