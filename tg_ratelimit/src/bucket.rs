use std::time::Duration;
use std::time::Instant;

/// Per-client token bucket with continuous refill
///
/// Tokens are fractional so that refill is smooth; only admission (`tokens >= 1`)
/// and deduction (one whole token) are integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    /// Current budget, always within `[0, capacity]`
    tokens: f64,

    /// Last time the balance was brought up to date
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn full(capacity: u32, now: Instant) -> Self {
        Self { tokens: f64::from(capacity), last_refill: now }
    }

    /// Add the tokens earned since the last refill, capped at `capacity`
    ///
    /// A `now` earlier than the last refill adds nothing and leaves the
    /// timestamp where it was.
    #[inline]
    pub fn refill(&mut self, now: Instant, capacity: u32, window: Duration) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let capacity = f64::from(capacity);

        // elapsed * capacity / window keeps whole-second refills exact
        self.tokens = (self.tokens + elapsed * capacity / window.as_secs_f64()).min(capacity);

        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Take one token if a whole one is available
    #[inline]
    pub fn try_take(&mut self) -> bool {
        if self.tokens < 1.0 {
            return false;
        }

        self.tokens -= 1.0;
        true
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Whether the bucket has gone untouched for at least `ttl`
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_refill) >= ttl
    }
}
