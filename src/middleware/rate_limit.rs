//! Fixed-window rate limiting.
//!
//! Each client identifier gets a counter and the instant its window opened.
//! The first request of a window (or the first after the window elapsed)
//! resets the counter to one. Later requests increment it and are denied once
//! it exceeds `max_requests`; denied requests do not increment it further.
//!
//! Windows are fixed, not sliding: a client can send `max_requests` at the
//! end of one window and `max_requests` again at the start of the next, so up
//! to twice the limit may pass within one window length around a boundary.
//!
//! Every [`PURGE_INTERVAL`] checks the limiter drops identifiers whose window
//! has elapsed, so the map stays bounded by the clients seen within roughly
//! one window.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{ApiError, Result};
use crate::pipeline::Middleware;
use crate::request::RequestContext;

/// Number of checks between sweeps of expired windows.
pub const PURGE_INTERVAL: u64 = 256;

fn default_max_requests() -> u32 {
    100
}

fn default_window_minutes() -> u64 {
    15
}

/// Rate-limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
}

impl RateLimitConfig {
    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes.saturating_mul(60))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_minutes: default_window_minutes(),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed; `remaining` more fit in this window.
    Allowed {
        /// Requests still allowed in the current window
        remaining: u32,
    },
    /// The request is over the limit.
    Limited {
        /// Time until the window resets
        retry_after: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    started: Instant,
}

/// Process-wide fixed-window counter map.
///
/// Shared between invocations of a warm instance. The read-modify-write for
/// one identifier happens under that identifier's map shard lock, so
/// concurrent requests never lose an increment.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use invocation_core::{ManualClock, middleware::{RateDecision, RateLimitConfig, RateLimiter}};
///
/// let clock = ManualClock::new();
/// let limiter = RateLimiter::with_clock(
///     RateLimitConfig { max_requests: 2, window_minutes: 1 },
///     Arc::new(clock.clone()),
/// );
///
/// assert!(matches!(limiter.check("10.0.0.1"), RateDecision::Allowed { .. }));
/// assert!(matches!(limiter.check("10.0.0.1"), RateDecision::Allowed { .. }));
/// assert!(matches!(limiter.check("10.0.0.1"), RateDecision::Limited { .. }));
///
/// clock.advance(Duration::from_secs(60));
/// assert!(matches!(limiter.check("10.0.0.1"), RateDecision::Allowed { .. }));
/// ```
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, RateWindow>,
    checks: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter on the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a limiter reading time from `clock`.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
            clock,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts a request from `client_id` and decides whether it may proceed.
    pub fn check(&self, client_id: &str) -> RateDecision {
        let decision = self.count(client_id);
        // The entry guard is released here; sweeping takes every shard lock.
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_INTERVAL == 0 {
            self.purge_expired();
        }
        decision
    }

    fn count(&self, client_id: &str) -> RateDecision {
        let now = self.clock.now();
        let window = self.config.window();
        let max = self.config.max_requests;

        let mut entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert(RateWindow {
                count: 0,
                started: now,
            });

        if entry.count == 0 || now.saturating_duration_since(entry.started) >= window {
            *entry = RateWindow {
                count: 1,
                started: now,
            };
            return RateDecision::Allowed {
                remaining: max.saturating_sub(1),
            };
        }

        if entry.count >= max {
            let retry_after = window.saturating_sub(now.saturating_duration_since(entry.started));
            return RateDecision::Limited { retry_after };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: max - entry.count,
        }
    }

    /// Requests counted for `client_id` in its current window.
    pub fn current_count(&self, client_id: &str) -> u32 {
        let now = self.clock.now();
        let window = self.config.window();
        self.windows
            .get(client_id)
            .filter(|w| now.saturating_duration_since(w.started) < window)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    /// Drops identifiers whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "purged expired rate-limit windows");
        }
        removed
    }

    /// Number of identifiers currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_clients", &self.windows.len())
            .finish_non_exhaustive()
    }
}

/// Pipeline unit denying clients over their limit with 429.
///
/// Clients are identified by [`RequestContext::client_id`]. Clones share
/// the same counters.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    /// Creates the unit around a shared limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// The underlying limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn handle(&self, ctx: &mut RequestContext) -> Result<()> {
        let client_id = ctx.client_id();
        match self.limiter.check(&client_id) {
            RateDecision::Allowed { remaining } => {
                ctx.response_headers
                    .insert("x-ratelimit-limit", self.limiter.config.max_requests.to_string());
                ctx.response_headers
                    .insert("x-ratelimit-remaining", remaining.to_string());
                Ok(())
            }
            RateDecision::Limited { retry_after } => {
                warn!(client_id = %client_id, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
                Err(ApiError::too_many_requests("Too many requests", retry_after).into())
            }
        }
    }
}
