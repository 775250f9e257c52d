//! Media kind shared across resolver, archive, and persistence layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two media kinds an asset can be resolved and archived as.
///
/// Every download candidate, cache entry, and durable-store upload is scoped
/// to exactly one kind; the persistent record holds independent durable-URL
/// fields per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Prefix for per-kind ephemeral download cache keys ("video_{key}")
    pub fn cache_key(&self, resolution_key: &str) -> String {
        format!("{}_{}", self.as_str(), resolution_key)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(MediaKind::Video.cache_key("k123"), "video_k123");
        assert_eq!(MediaKind::Audio.cache_key("k123"), "audio_k123");
    }

    #[test]
    fn test_deserialize_lowercase() {
        let kind: MediaKind = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(kind, MediaKind::Audio);
    }
}
