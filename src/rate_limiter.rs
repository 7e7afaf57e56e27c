//! Per-provider rate limiting and 429 backoff.
//!
//! Each provider gets a token bucket sized to its documented requests-per-
//! minute plus an exponential cooldown that is extended on every rate-limit
//! response and cleared on the next success. The limiter is the one shared
//! mutable resource across fetch workers, so all state lives behind the
//! governor limiter's atomic accounting and a tokio mutex.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Default)]
struct BackoffState {
    attempt: u32,
    cooldown_until: Option<Instant>,
}

/// Token bucket plus exponential backoff for one provider.
pub struct ProviderLimiter {
    provider: &'static str,
    limiter: DirectLimiter,
    backoff: Mutex<BackoffState>,
    base_delay: Duration,
    max_delay: Duration,
}

impl ProviderLimiter {
    pub fn new(
        provider: &'static str,
        requests_per_minute: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute.max(1))
            .expect("max(1) guarantees a non-zero quota");
        Self {
            provider,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            backoff: Mutex::new(BackoffState::default()),
            base_delay,
            max_delay,
        }
    }

    /// Wait until a call to this provider is allowed: first any active 429
    /// cooldown, then a bucket token.
    pub async fn acquire(&self) {
        let deadline = {
            let state = self.backoff.lock().await;
            state.cooldown_until
        };
        if let Some(deadline) = deadline {
            if deadline > Instant::now() {
                debug!(provider = self.provider, "waiting out rate-limit cooldown");
                tokio::time::sleep_until(deadline).await;
            }
        }
        self.limiter.until_ready().await;
    }

    /// Record a 429 from this provider: extend the cooldown exponentially
    /// (base * 2^attempt, capped).
    pub async fn note_rate_limited(&self) {
        let mut state = self.backoff.lock().await;
        let exponent = state.attempt.min(16); // cap the shift, not just the delay
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        state.attempt += 1;
        state.cooldown_until = Some(Instant::now() + delay);
        warn!(
            provider = self.provider,
            attempt = state.attempt,
            delay_ms = delay.as_millis() as u64,
            "provider rate limited, backing off"
        );
    }

    /// Record a successful (non-429) call, clearing any backoff state.
    pub async fn note_success(&self) {
        let mut state = self.backoff.lock().await;
        if state.attempt > 0 {
            debug!(provider = self.provider, "rate-limit cooldown cleared");
        }
        state.attempt = 0;
        state.cooldown_until = None;
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }
}

impl std::fmt::Debug for ProviderLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLimiter")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
