use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `expires_at` value for records that never expire.
pub const NEVER_EXPIRES: u64 = 0;

/// Latest expiry a record can carry. The durable store keeps expiries as
/// signed 64-bit integers.
pub const MAX_EXPIRES_AT: u64 = i64::MAX as u64;

/// A short code bound to its target URL, as held in both the cache and the
/// durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub code: String,
    pub target: String,
    /// Absolute epoch second, or [`NEVER_EXPIRES`].
    pub expires_at: u64,
}

impl Record {
    pub fn new(code: impl Into<String>, target: impl Into<String>, expires_at: u64) -> Self {
        Self {
            code: code.into(),
            target: target.into(),
            expires_at,
        }
    }

    /// `true` once `now` has passed the expiry. A record is still live during
    /// its `expires_at` second. Never-expiring records are never expired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != NEVER_EXPIRES && self.expires_at < now
    }
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Absolute expiry for a record created at `now` with the given TTL.
///
/// A zero TTL means "never". Sub-second remainders round up so that a short
/// but non-zero TTL can't collapse into [`NEVER_EXPIRES`]. Results are capped
/// at [`MAX_EXPIRES_AT`].
pub fn expiry_after(now: u64, ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return NEVER_EXPIRES;
    }
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    now.saturating_add(secs).min(MAX_EXPIRES_AT)
}
