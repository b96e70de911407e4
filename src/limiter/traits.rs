//! Rate limiter abstraction
//!
//! Admission decisions are made behind this trait so the in-memory log can be
//! swapped for a shared store without touching the request handlers.

use std::time::Instant;

use async_trait::async_trait;

/// Per-client admission policy
/// Implementations must be thread-safe and async-compatible
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Record an attempt by `client_id` at `now`.
    /// Returns `true` if the request is admitted, `false` if it is over quota.
    async fn admit(&self, client_id: &str, now: Instant) -> bool;
}
