//! Per-client rate limiting.
//!
//! Each client identifier owns an independent sliding window of admitted
//! request timestamps. Windows live in a [`DashMap`]; admission holds the
//! client's entry lock while it prunes, checks and records, so concurrent
//! calls for the same client are serialized while unrelated clients only
//! contend when they share a shard.
//!
//! Windows with no live timestamps are dropped every
//! [`DEFAULT_PURGE_INTERVAL`] admission checks (see
//! [`RateLimiter::with_purge_interval`]), so the map only holds clients
//! seen recently. [`RateLimiter::purge_idle`] does the same on demand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Allowed {
        /// Requests still available in the current window.
        remaining: u32,
    },
    /// The window is full; nothing was recorded.
    Denied {
        /// Time until the oldest admitted request leaves the window.
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Admission checks between opportunistic purges of idle windows.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

/// Sliding-window rate limiter keyed by client identifier.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, VecDeque<Instant>>,
    purge_interval: u64,
    checks: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window` per client.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
            purge_interval: DEFAULT_PURGE_INTERVAL,
            checks: AtomicU64::new(0),
        }
    }

    /// Purge idle windows every `interval` admission checks instead of
    /// every [`DEFAULT_PURGE_INTERVAL`]. Zero disables the automatic purge.
    #[must_use]
    pub fn with_purge_interval(mut self, interval: u64) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Admission checks between automatic purges; zero when disabled.
    #[must_use]
    pub fn purge_interval(&self) -> u64 {
        self.purge_interval
    }

    /// Admit or deny one request from `client_id`.
    ///
    /// Admitted requests are recorded in the client's window; denied
    /// requests are not.
    pub fn admit(&self, client_id: &str) -> Admission {
        // Purge before taking the entry lock; `retain` locks every shard.
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if self.purge_interval > 0 && checks % self.purge_interval == 0 {
            let purged = self.purge_idle();
            tracing::trace!(purged, "purged idle rate-limit windows");
        }

        let now = Instant::now();
        let mut timestamps = self.windows.entry(client_id.to_owned()).or_default();
        prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests as usize {
            let retry_after = timestamps
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(self.window);
            tracing::debug!(client = client_id, ?retry_after, "request denied");
            return Admission::Denied { retry_after };
        }

        timestamps.push_back(now);
        let remaining = self
            .max_requests
            .saturating_sub(timestamps.len() as u32);
        Admission::Allowed { remaining }
    }

    /// Requests `client_id` may still make in the current window.
    #[must_use]
    pub fn remaining(&self, client_id: &str) -> u32 {
        let now = Instant::now();
        let used = self
            .windows
            .get(client_id)
            .map(|w| live_count(&w, now, self.window))
            .unwrap_or(0);
        self.max_requests.saturating_sub(used as u32)
    }

    /// When the oldest live request of `client_id` leaves the window.
    #[must_use]
    pub fn reset_at(&self, client_id: &str) -> Option<Instant> {
        let now = Instant::now();
        let window = self.windows.get(client_id)?;
        window
            .iter()
            .find(|&&t| now.duration_since(t) < self.window)
            .and_then(|&t| t.checked_add(self.window))
    }

    /// Drop windows whose timestamps have all expired.
    ///
    /// Returns the number of clients removed.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients with a tracked window.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&first) = timestamps.front() {
        if now.duration_since(first) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

fn live_count(timestamps: &VecDeque<Instant>, now: Instant, window: Duration) -> usize {
    timestamps
        .iter()
        .filter(|&&t| now.duration_since(t) < window)
        .count()
}
