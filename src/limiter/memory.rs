//! In-memory sliding-window log
//!
//! Each client keeps the timestamps of its admitted requests that still fall
//! inside the trailing window. A request is admitted only while fewer than
//! `limit` timestamps remain after pruning, so no trailing window ever holds
//! more than `limit` admissions.
//!
//! Client entries are created on first contact and are not removed by
//! admission itself; a drained entry lingers until [`InMemoryRateLimiter::sweep`]
//! runs. Without the sweep task the map grows with the number of distinct
//! client identities seen over the process lifetime.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;

use super::traits::RateLimiter;

/// Sharded per-client request log
pub struct InMemoryRateLimiter {
    limit: usize,
    window: Duration,
    windows: DashMap<String, VecDeque<Instant>>,
    shutdown: Notify,
}

impl InMemoryRateLimiter {
    /// Create a limiter admitting `limit` requests per `window`
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            windows: DashMap::new(),
            shutdown: Notify::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Prune, check and possibly record one request for `client_id`
    pub fn check(&self, client_id: &str, now: Instant) -> bool {
        // Same-client calls serialize on the shard lock held by `log`
        let mut log = match self.windows.get_mut(client_id) {
            Some(log) => log,
            None => self.windows.entry(client_id.to_string()).or_default(),
        };

        prune(&mut log, now, self.window);

        if log.len() >= self.limit {
            warn!(client = client_id, in_window = log.len(), "Rate limit exceeded");
            return false;
        }

        log.push_back(now);
        true
    }

    /// Number of client identities currently held in memory
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Drop clients whose log is empty once aged entries are pruned.
    /// Returns the number of identities removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let window = self.window;
        self.windows.retain(|_, log| {
            prune(log, now, window);
            !log.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Start the background sweep task
    pub async fn start_sweep_task(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let removed = self.sweep(Instant::now());
                    debug!(removed, remaining = self.tracked_clients(), "Rate limiter sweep");
                }
                _ = self.shutdown.notified() => {
                    info!("Rate limiter sweep task shutting down");
                    break;
                }
            }
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn admit(&self, client_id: &str, now: Instant) -> bool {
        self.check(client_id, now)
    }
}

/// Remove timestamps at least `window` older than `now`.
/// Timestamps later than `now` count as age zero and are kept.
fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = log.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        log.pop_front();
    }
}
