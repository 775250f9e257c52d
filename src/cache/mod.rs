//! In-process TTL cache
//!
//! One cache instance backs three resolution concerns: the cached origin
//! endpoint, resolved asset info, and ephemeral download URLs. Entries carry
//! per-entry TTLs; expiry is checked lazily on `get` and swept periodically
//! by a background task.

mod ttl;

pub use ttl::{spawn_cache_sweeper, CacheStats, TtlCache};

use crate::db::schemas::AssetInfo;

/// Value stored in the shared resolution cache.
///
/// The cache itself is generic; this enum is the concrete value type used by
/// the resolver and origin client so a single instance (and a single stats
/// block) covers all lookups.
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Currently selected origin content-delivery endpoint
    Endpoint(String),
    /// Resolved asset info, keyed by a hash of the input URL
    Info(AssetInfo),
    /// Ephemeral download URL and quality label, keyed by "{kind}_{key}"
    Download { url: String, quality_label: String },
}
