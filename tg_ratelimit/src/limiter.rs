use crate::error::RateLimitError;
use crate::error::Result;

/// Admission check consulted by the request pipeline before business logic runs
///
/// Implementations partition their budget by client address and must be safe
/// to call from many request tasks at once.
pub trait RateLimiter: Send + Sync {
    /// Admit or reject one request from `client_addr`
    ///
    /// The address may carry a port; implementations normalise it themselves.
    /// Never fails: a malformed address is used verbatim as the key.
    fn allow(&self, client_addr: &str) -> bool;

    /// Same decision as [`RateLimiter::allow`], as a `Result` for `?` chains
    fn check(&self, client_addr: &str) -> Result<()> {
        if self.allow(client_addr) {
            Ok(())
        } else {
            Err(RateLimitError::Exceeded)
        }
    }

    /// Maximum number of tokens a single client can hold
    fn capacity(&self) -> u32;

    /// Number of clients currently holding state
    fn tracked_clients(&self) -> usize;

    /// Forget every client
    fn reset(&self);
}
