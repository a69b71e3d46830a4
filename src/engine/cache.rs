// In-memory map of track keys to resolved direct URLs with lazy expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

struct CacheEntry {
    direct_url: String,
    expires_at: Instant,
}

/// Short-TTL cache of resolved direct media URLs.
///
/// Resolving a direct URL is an expensive, rate-limited external call;
/// caching it briefly absorbs client retries and range-resumed playback
/// of the same track without holding on to URLs past their provider
/// expiry. Expired entries are treated as absent on read; there is no
/// background sweep.
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached URL for `track_id` if the entry has not expired.
    pub fn get(&self, track_id: &str) -> Option<String> {
        self.get_at(track_id, Instant::now())
    }

    fn get_at(&self, track_id: &str, now: Instant) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(track_id)?;
        if now < entry.expires_at {
            Some(entry.direct_url.clone())
        } else {
            None
        }
    }

    /// Store or overwrite the entry for `track_id`, expiring after `ttl`.
    pub fn put(&self, track_id: &str, direct_url: &str, ttl: Duration) {
        let entry = CacheEntry {
            direct_url: direct_url.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(track_id.to_string(), entry);
        debug!("cached direct url for track={} ttl={}s", track_id, ttl.as_secs());
    }

    /// Remove the entry for `track_id`. Missing keys are a no-op.
    pub fn invalidate(&self, track_id: &str) {
        if self.entries.write().remove(track_id).is_some() {
            debug!("invalidated cached url for track={}", track_id);
        }
    }

    /// Number of entries currently stored, including any not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}
