use std::time::Duration;

use serde::Deserialize;

use crate::error::RateLimitError;
use crate::error::Result;

pub const DEFAULT_CAPACITY: u32 = 10;
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Rate limiter settings as they appear in the `[rate_limit]` config section
///
/// Optional durations default to the window length.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests a client may burst, and the number restored per window
    pub capacity: u32,

    /// Time for an empty bucket to refill completely
    pub window_ms: u64,

    /// Idle time after which a client entry may be dropped
    pub idle_ttl_ms: Option<u64>,

    /// How often the sweeper looks for idle clients
    pub sweep_interval_ms: Option<u64>,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl_ms.map_or_else(|| self.window(), Duration::from_millis)
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval_ms.map_or_else(|| self.window(), Duration::from_millis)
    }

    /// Reject settings the limiter cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(RateLimitError::InvalidConfig("capacity must be greater than 0"));
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::InvalidConfig("window must be greater than 0"));
        }
        // Shorter TTLs would drop partially drained buckets and hand out fresh budget
        if self.idle_ttl() < self.window() {
            return Err(RateLimitError::InvalidConfig("idle_ttl must not be shorter than window"));
        }
        if self.sweep_interval().is_zero() {
            return Err(RateLimitError::InvalidConfig("sweep_interval must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, window_ms: DEFAULT_WINDOW_MS, idle_ttl_ms: None, sweep_interval_ms: None }
    }
}
