//! Rate limiting keyed by caller identity
//!
//! Built on `governor`'s keyed GCRA limiter: each key may spend
//! `requests_per_window` cells at once, and cells replenish evenly over the
//! window. A rejected request is answered immediately with the time until the
//! next cell frees up; callers are never parked waiting for capacity.

use governor::clock::Clock as GovernorClock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter as KeyedLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::GatewayError;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per key per window, `0` disables limiting
    pub requests_per_window: u32,
    pub window_secs: u64,
    /// Tracked keys before idle ones are evicted
    pub max_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_secs: 60,
            max_keys: 10_000,
        }
    }
}

impl RateLimitConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            requests_per_window: std::env::var("RATE_LIMIT_REQUESTS_PER_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.requests_per_window),
            window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.window_secs),
            max_keys: std::env::var("RATE_LIMIT_MAX_KEYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_keys),
        }
    }

    /// `None` when limiting is disabled
    fn quota(&self) -> Option<Quota> {
        let burst = NonZeroU32::new(self.requests_per_window)?;
        let window = Duration::from_secs(self.window_secs.max(1));
        Quota::with_period(window / burst.get()).map(|quota| quota.allow_burst(burst))
    }
}

/// Adapts the crate clock to `governor`, so pinned test clocks drive the limiter too
#[derive(Clone)]
pub struct LimiterClock(SharedClock);

impl GovernorClock for LimiterClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        let nanos = self.0.now().timestamp_nanos_opt().unwrap_or(0).max(0) as u64;
        Nanos::from(Duration::from_nanos(nanos))
    }
}

type Limiter =
    KeyedLimiter<String, DashMapStateStore<String>, LimiterClock, NoOpMiddleware<Nanos>>;

#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<Limiter>>,
    clock: LimiterClock,
    max_keys: usize,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        let clock = LimiterClock(clock);
        let limiter = config.quota().map(|quota| {
            Arc::new(KeyedLimiter::new(
                quota,
                DashMapStateStore::default(),
                clock.clone(),
            ))
        });

        Self {
            limiter,
            clock,
            max_keys: config.max_keys,
        }
    }

    /// Admit or reject one request for `key`
    pub fn check(&self, key: &str) -> Result<(), GatewayError> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        let result = limiter.check_key(&key.to_string());
        if limiter.len() > self.max_keys {
            limiter.retain_recent();
        }

        match result {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let retry_after = whole_secs(not_until.wait_time_from(self.clock.now()));
                tracing::debug!(key, retry_after, "Rate limit exceeded");
                Err(GatewayError::rate_limited(retry_after))
            },
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

fn whole_secs(wait: Duration) -> u64 {
    (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1)
}
