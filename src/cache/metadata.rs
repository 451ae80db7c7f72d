use serde::Serialize;

/// Sentinel for "remaining TTL unknown / not cached".
pub const TTL_UNKNOWN: i64 = -1;

/// Per-request cache outcome.
///
/// Created with defaults when the request starts. Only the cache-aside layer
/// records outcomes; the request boundary reads it after the handler returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheMetadata {
    hit: bool,
    ttl_remaining: i64,
    touched: bool,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            hit: false,
            ttl_remaining: TTL_UNKNOWN,
            touched: false,
        }
    }
}

impl CacheMetadata {
    pub fn hit(&self) -> bool {
        self.hit
    }

    pub fn ttl_remaining(&self) -> i64 {
        self.ttl_remaining
    }

    /// Whether a cache-aside wrapped operation ran during this request.
    pub fn touched(&self) -> bool {
        self.touched
    }

    /// "hit" or "miss", for response fields.
    pub fn status(&self) -> &'static str {
        if self.hit {
            "hit"
        } else {
            "miss"
        }
    }

    pub(crate) fn record_hit(&mut self, ttl_remaining: Option<u64>) {
        self.hit = true;
        self.touched = true;
        self.ttl_remaining = ttl_remaining.map(clamp_ttl).unwrap_or(TTL_UNKNOWN);
    }

    pub(crate) fn record_miss(&mut self, ttl_secs: u64) {
        self.hit = false;
        self.touched = true;
        self.ttl_remaining = clamp_ttl(ttl_secs);
    }
}

fn clamp_ttl(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
