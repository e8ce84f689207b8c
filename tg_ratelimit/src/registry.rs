use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::bucket::TokenBucket;
use crate::client_key;
use crate::config::RateLimitConfig;
use crate::error::RateLimitError;
use crate::error::Result;
use crate::limiter::RateLimiter;

/// Per-client token bucket rate limiter
///
/// Every client address gets its own bucket, created full on first sight.
/// All buckets live in one map behind one lock, so the refill, test and
/// deduct sequence for a client is atomic with respect to every other request.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, TokenBucket>>,

    /// Maximum tokens per client
    capacity: u32,

    /// Time for an empty bucket to refill completely
    window: Duration,

    /// Entries untouched for this long are dropped by `evict_idle`
    idle_ttl: Duration,
}

impl ClientRegistry {
    /// Create a registry where each client may make `capacity` requests per `window`
    pub fn new(capacity: u32, window: Duration) -> Result<Self> {
        Self::builder().capacity(capacity).window(window).build()
    }

    /// Create a registry from the `[rate_limit]` config section
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_parts(config.capacity, config.window(), config.idle_ttl()))
    }

    /// Create a builder for configuring a registry
    pub fn builder() -> ClientRegistryBuilder {
        ClientRegistryBuilder::new()
    }

    fn with_parts(capacity: u32, window: Duration, idle_ttl: Duration) -> Self {
        Self { clients: Mutex::new(HashMap::new()), capacity, window, idle_ttl }
    }

    /// Admission decision for `client_addr` as of `now`
    ///
    /// Callers racing on the same client may pass slightly out-of-order
    /// instants; the bucket never moves its refill timestamp backwards.
    pub fn allow_at(&self, client_addr: &str, now: Instant) -> bool {
        let key = client_key::normalize(client_addr);
        let mut clients = self.clients.lock();
        Self::admit(&mut clients, key, now, self.capacity, self.window)
    }

    fn admit(clients: &mut HashMap<String, TokenBucket>, key: String, now: Instant, capacity: u32, window: Duration) -> bool {
        let bucket = clients.entry(key).or_insert_with_key(|key| {
            debug!(client = %key, capacity, "tracking new client");
            TokenBucket::full(capacity, now)
        });

        bucket.refill(now, capacity, window);
        bucket.try_take()
    }

    /// Stored balance for a client, without refilling it
    pub fn tokens(&self, client_addr: &str) -> Option<f64> {
        let key = client_key::normalize(client_addr);
        self.clients.lock().get(&key).map(TokenBucket::tokens)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Drop clients whose last update is at least `idle_ttl` old
    ///
    /// Since `idle_ttl >= window`, every dropped bucket had already earned
    /// back its full capacity, so the client's next request sees no difference.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, bucket| !bucket.is_idle(now, self.idle_ttl));

        let evicted = before - clients.len();
        if evicted > 0 {
            debug!(evicted, remaining = clients.len(), "evicted idle clients");
        }

        evicted
    }
}

impl RateLimiter for ClientRegistry {
    fn allow(&self, client_addr: &str) -> bool {
        let key = client_key::normalize(client_addr);
        let mut clients = self.clients.lock();

        // Read the clock under the lock so refill timestamps stay ordered
        let now = Instant::now();
        Self::admit(&mut clients, key, now, self.capacity, self.window)
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }

    fn reset(&self) {
        self.clients.lock().clear();
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        let config = RateLimitConfig::default();
        Self::with_parts(config.capacity, config.window(), config.idle_ttl())
    }
}

/// Builder for configuring a client registry
pub struct ClientRegistryBuilder {
    capacity: Option<u32>,
    window: Option<Duration>,
    idle_ttl: Option<Duration>,
}

impl ClientRegistryBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { capacity: None, window: None, idle_ttl: None }
    }

    /// Set the bucket capacity (max tokens)
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the time for an empty bucket to refill completely
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set how long a client may stay idle before eviction (defaults to the window)
    pub fn idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = Some(idle_ttl);
        self
    }

    /// Capacity per minute
    pub fn per_minute(self, capacity: u32) -> Self {
        self.capacity(capacity).window(Duration::from_secs(60))
    }

    /// Build the registry, falling back to the defaults for unset values
    pub fn build(self) -> Result<ClientRegistry> {
        let defaults = RateLimitConfig::default();
        let capacity = self.capacity.unwrap_or(defaults.capacity);
        let window = self.window.unwrap_or_else(|| defaults.window());
        let idle_ttl = self.idle_ttl.unwrap_or(window);

        if capacity == 0 {
            return Err(RateLimitError::InvalidConfig("capacity must be greater than 0"));
        }
        if window.is_zero() {
            return Err(RateLimitError::InvalidConfig("window must be greater than 0"));
        }
        if idle_ttl < window {
            return Err(RateLimitError::InvalidConfig("idle_ttl must not be shorter than window"));
        }

        Ok(ClientRegistry::with_parts(capacity, window, idle_ttl))
    }
}

impl Default for ClientRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Barrier;

    use proptest::prelude::*;

    use super::*;

    fn registry(capacity: u32, window_secs: u64) -> ClientRegistry {
        ClientRegistry::new(capacity, Duration::from_secs(window_secs)).unwrap()
    }

    #[test]
    fn test_creation() {
        let limiter = ClientRegistry::default();
        assert_eq!(limiter.capacity(), 10);
        assert_eq!(limiter.window(), Duration::from_secs(60));
        assert_eq!(limiter.idle_ttl(), Duration::from_secs(60));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_first_request_admitted() {
        let limiter = registry(1, 60);

        assert!(limiter.allow("10.0.0.1:1234"));
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.tokens("10.0.0.1"), Some(0.0));
    }

    #[test]
    fn test_exceeds_capacity() {
        let limiter = registry(10, 60);
        let now = Instant::now();

        for i in 0..10 {
            assert!(limiter.allow_at("1.2.3.4", now), "request {i} should be admitted");
        }
        assert!(!limiter.allow_at("1.2.3.4", now));
        assert!(matches!(limiter.check("1.2.3.4"), Err(RateLimitError::Exceeded)));
    }

    #[test]
    fn test_rejection_does_not_deduct() {
        let limiter = registry(1, 60);
        let now = Instant::now();

        assert!(limiter.allow_at("1.2.3.4", now));
        assert!(!limiter.allow_at("1.2.3.4", now));
        assert!(!limiter.allow_at("1.2.3.4", now));
        assert_eq!(limiter.tokens("1.2.3.4"), Some(0.0));
    }

    #[test]
    fn test_refill_scenario() {
        let limiter = registry(10, 60);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.allow_at("1.2.3.4", start));
        }
        assert_eq!(limiter.tokens("1.2.3.4"), Some(0.0));
        assert!(!limiter.allow_at("1.2.3.4", start));

        // 10% of the window refills exactly one token
        let later = start + Duration::from_secs(6);
        assert!(limiter.allow_at("1.2.3.4", later));
        assert_eq!(limiter.tokens("1.2.3.4"), Some(0.0));
        assert!(!limiter.allow_at("1.2.3.4", later));
    }

    #[test]
    fn test_full_window_restores_capacity() {
        let limiter = registry(5, 60);
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("1.2.3.4", start));
        }

        let later = start + Duration::from_secs(60);
        for _ in 0..5 {
            assert!(limiter.allow_at("1.2.3.4", later));
        }
        assert!(!limiter.allow_at("1.2.3.4", later));
    }

    #[test]
    fn test_long_idle_is_clamped() {
        let limiter = registry(3, 60);
        let start = Instant::now();

        assert!(limiter.allow_at("1.2.3.4", start));

        let later = start + Duration::from_secs(24 * 3600);
        for _ in 0..3 {
            assert!(limiter.allow_at("1.2.3.4", later));
        }
        assert!(!limiter.allow_at("1.2.3.4", later));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = registry(2, 60);
        let now = Instant::now();

        assert!(limiter.allow_at("1.1.1.1", now));
        assert!(limiter.allow_at("1.1.1.1", now));
        assert!(!limiter.allow_at("1.1.1.1", now));

        assert!(limiter.allow_at("2.2.2.2", now));
        assert!(limiter.allow_at("2.2.2.2", now));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_ports_and_loopback_share_bucket() {
        let limiter = registry(3, 60);
        let now = Instant::now();

        assert!(limiter.allow_at("127.0.0.1:5000", now));
        assert!(limiter.allow_at("[::1]:5001", now));
        assert!(limiter.allow_at("::1", now));
        assert!(!limiter.allow_at("127.0.0.1:5002", now));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_malformed_address_is_a_key() {
        let limiter = registry(1, 60);
        let now = Instant::now();

        assert!(limiter.allow_at("garbage", now));
        assert!(!limiter.allow_at("garbage", now));
        assert!(limiter.allow_at("", now));
    }

    #[test]
    fn test_reset() {
        let limiter = registry(1, 60);

        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));

        limiter.reset();
        assert_eq!(limiter.tracked_clients(), 0);
        assert!(limiter.allow("1.2.3.4"));
    }

    #[test]
    fn test_evict_idle() {
        let limiter = registry(5, 60);
        let start = Instant::now();

        assert!(limiter.allow_at("1.1.1.1", start));
        assert!(limiter.allow_at("2.2.2.2", start + Duration::from_secs(30)));

        assert_eq!(limiter.evict_idle(start + Duration::from_secs(59)), 0);
        assert_eq!(limiter.evict_idle(start + Duration::from_secs(60)), 1);
        assert_eq!(limiter.tokens("1.1.1.1"), None);
        assert_eq!(limiter.tokens("2.2.2.2"), Some(4.0));
    }

    #[test]
    fn test_evicted_client_starts_full() {
        let limiter = registry(2, 60);
        let start = Instant::now();

        assert!(limiter.allow_at("1.1.1.1", start));
        assert!(limiter.allow_at("1.1.1.1", start));

        let later = start + Duration::from_secs(90);
        assert_eq!(limiter.evict_idle(later), 1);

        assert!(limiter.allow_at("1.1.1.1", later));
        assert!(limiter.allow_at("1.1.1.1", later));
        assert!(!limiter.allow_at("1.1.1.1", later));
    }

    #[test]
    fn test_builder() {
        let limiter = ClientRegistry::builder().capacity(20).window(Duration::from_secs(10)).idle_ttl(Duration::from_secs(600)).build().unwrap();

        assert_eq!(limiter.capacity(), 20);
        assert_eq!(limiter.window(), Duration::from_secs(10));
        assert_eq!(limiter.idle_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_builder_per_minute() {
        let limiter = ClientRegistry::builder().per_minute(120).build().unwrap();

        assert_eq!(limiter.capacity(), 120);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(matches!(ClientRegistry::builder().capacity(0).build(), Err(RateLimitError::InvalidConfig(_))));
        assert!(matches!(ClientRegistry::builder().window(Duration::ZERO).build(), Err(RateLimitError::InvalidConfig(_))));
        assert!(matches!(
            ClientRegistry::builder().window(Duration::from_secs(60)).idle_ttl(Duration::from_secs(1)).build(),
            Err(RateLimitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig { capacity: 3, window_ms: 1_000, idle_ttl_ms: Some(5_000), sweep_interval_ms: None };
        let limiter = ClientRegistry::from_config(&config).unwrap();

        assert_eq!(limiter.capacity(), 3);
        assert_eq!(limiter.window(), Duration::from_secs(1));
        assert_eq!(limiter.idle_ttl(), Duration::from_secs(5));

        let invalid = RateLimitConfig { capacity: 0, ..Default::default() };
        assert!(ClientRegistry::from_config(&invalid).is_err());
    }

    #[test]
    fn test_concurrent_access_same_client() {
        let limiter = Arc::new(registry(10, 3600));
        let threads = 32;
        let barrier = Arc::new(Barrier::new(threads));
        let now = Instant::now();

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.allow_at("9.9.9.9", now)
                })
            })
            .collect();

        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|&ok| ok).count();

        // Exactly min(N, C) admissions, no double spending
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_concurrent_access_fewer_requests_than_capacity() {
        let limiter = Arc::new(registry(100, 3600));
        let mut handles = vec![];

        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || limiter.allow("9.9.9.9:80")));
        }

        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|&ok| ok).count();
        assert_eq!(admitted, 8);
    }

    #[test]
    fn test_concurrent_access_many_clients() {
        let limiter = Arc::new(registry(5, 3600));
        let now = Instant::now();
        let mut handles = vec![];

        for client in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                let addr = format!("10.0.0.{client}:4000");
                (0..20).filter(|_| limiter.allow_at(&addr, now)).count()
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 5);
        }
        assert_eq!(limiter.tracked_clients(), 10);
    }

    proptest! {
        #[test]
        fn prop_tokens_stay_within_bounds(capacity in 1u32..50, requests in 0usize..100, idle_ms in 0u64..10_000_000) {
            let limiter = registry(capacity, 60);
            let start = Instant::now();

            for _ in 0..requests {
                limiter.allow_at("1.2.3.4", start);
            }
            limiter.allow_at("1.2.3.4", start + Duration::from_millis(idle_ms));

            let tokens = limiter.tokens("1.2.3.4").unwrap();
            prop_assert!(tokens >= 0.0);
            prop_assert!(tokens <= f64::from(capacity));
        }

        #[test]
        fn prop_burst_admits_exactly_capacity(capacity in 1u32..200, extra in 1u32..50) {
            let limiter = registry(capacity, 60);
            let now = Instant::now();

            let admitted = (0..capacity + extra).filter(|_| limiter.allow_at("1.2.3.4", now)).count();
            prop_assert_eq!(admitted, capacity as usize);
        }
    }
}
