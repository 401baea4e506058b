// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Outcome of one limiter consultation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allowed {
    pub allowed: bool,
    /// Share of requests allowed over the current and previous windows.
    /// Ends up on kept spans as `_dd.limit_psr`.
    pub effective_rate: f64,
}

/// A token bucket rate limiter implementation
#[derive(Clone)]
pub struct RateLimiter {
    /// Rate limit value that doesn't need to be protected by mutex:
    /// * rate_limit > 0: max number of requests to allow per second
    /// * rate_limit == 0: disallow all requests
    /// * rate_limit < 0: allow all requests
    rate_limit: f64,

    /// Inner state protected by a mutex for thread safety
    inner: Arc<Mutex<RateLimiterState>>,
}

/// The internal state of the rate limiter
struct RateLimiterState {
    /// The time window in nanoseconds where the rate limit applies
    time_window_ns: u64,

    /// Current number of tokens available, fractional while refilling
    tokens: f64,

    /// Maximum number of tokens that can be stored
    max_tokens: f64,

    /// Last time tokens were replenished
    last_update: Instant,

    /// Start time of the current window
    current_window_start: Option<Instant>,

    /// Number of tokens allowed in the current window
    tokens_allowed: u64,

    /// Total number of token requests in the current window
    tokens_total: u64,

    /// Rate from the previous window for calculating effective rate
    prev_window_rate: Option<f64>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock().unwrap();
        f.debug_struct("RateLimiter")
            .field("rate_limit", &self.rate_limit)
            .field("tokens", &state.tokens)
            .finish()
    }
}

impl RateLimiter {
    /// Creates a new RateLimiter with the given per-second limit.
    ///
    /// `time_window_ns` defaults to 1 second.
    pub fn new(rate_limit: f64, time_window_ns: Option<u64>) -> Self {
        let window_ns = time_window_ns.unwrap_or(1_000_000_000);

        let state = RateLimiterState {
            time_window_ns: window_ns,
            tokens: rate_limit.max(0.0),
            max_tokens: rate_limit.max(0.0),
            last_update: Instant::now(),
            current_window_start: None,
            tokens_allowed: 0,
            tokens_total: 0,
            prev_window_rate: None,
        };

        RateLimiter {
            rate_limit,
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Checks if the current request is allowed, consuming a token if it is.
    pub fn allow(&self) -> Allowed {
        self.allow_at(Instant::now())
    }

    /// Timestamp-injectable variant of [`RateLimiter::allow`].
    pub fn allow_at(&self, timestamp: Instant) -> Allowed {
        let allowed = self.is_allowed_at(timestamp);
        self.update_rate_counts(allowed, timestamp);
        Allowed {
            allowed,
            effective_rate: self.effective_rate(),
        }
    }

    /// Internal method to check if a request is allowed at the given time
    fn is_allowed_at(&self, timestamp: Instant) -> bool {
        if self.rate_limit == 0.0 {
            return false;
        }
        if self.rate_limit < 0.0 {
            return true;
        }

        let mut state = self.inner.lock().unwrap();

        // Try to consume first, replenish only when the bucket ran dry
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            self.replenish(&mut state, timestamp);

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                true
            } else {
                false
            }
        }
    }

    /// Update counts used to determine effective rate
    fn update_rate_counts(&self, allowed: bool, timestamp: Instant) {
        let mut state = self.inner.lock().unwrap();

        // No window start yet, start a new window
        if state.current_window_start.is_none() {
            state.current_window_start = Some(timestamp);
        }
        // If more time than the configured time window has passed, reset
        else if let Some(window_start) = state.current_window_start {
            let elapsed = timestamp.saturating_duration_since(window_start);
            if elapsed.as_nanos() as u64 >= state.time_window_ns {
                // Store previous window's rate
                state.prev_window_rate = Some(Self::current_window_rate(&state));
                state.tokens_allowed = 0;
                state.tokens_total = 0;
                state.current_window_start = Some(timestamp);
            }
        }

        // Keep track of total tokens seen vs allowed
        if allowed {
            state.tokens_allowed += 1;
        }
        state.tokens_total += 1;
    }

    /// Replenish tokens based on elapsed time
    fn replenish(&self, state: &mut RateLimiterState, timestamp: Instant) {
        let elapsed = timestamp.saturating_duration_since(state.last_update);

        let tokens_to_add =
            (elapsed.as_nanos() as f64 / state.time_window_ns as f64) * self.rate_limit;

        if tokens_to_add > 0.0 {
            state.tokens = (state.tokens + tokens_to_add).min(state.max_tokens);
        }
        // Always update last_update, even if no tokens were added
        state.last_update = timestamp;
    }

    /// Calculate the current window rate
    fn current_window_rate(state: &RateLimiterState) -> f64 {
        // No tokens have been seen, effectively 100% sample rate
        if state.tokens_total == 0 {
            return 1.0;
        }

        state.tokens_allowed as f64 / state.tokens_total as f64
    }

    /// Returns the effective sample rate of this rate limiter (between 0.0 and 1.0)
    pub fn effective_rate(&self) -> f64 {
        let state = self.inner.lock().unwrap();

        // If we have not had a previous window yet, return current rate
        if let Some(prev_rate) = state.prev_window_rate {
            (Self::current_window_rate(&state) + prev_rate) / 2.0
        } else {
            Self::current_window_rate(&state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_rate_limiter_allow_all() {
        let limiter = RateLimiter::new(-1.0, None);

        for _ in 0..100 {
            assert!(limiter.allow().allowed);
        }

        assert_eq!(limiter.effective_rate(), 1.0);
    }

    #[test]
    fn test_rate_limiter_block_all() {
        let limiter = RateLimiter::new(0.0, None);

        for _ in 0..10 {
            assert!(!limiter.allow().allowed);
        }

        assert_eq!(limiter.effective_rate(), 0.0);
    }

    #[test]
    fn test_rate_limiter_limit_rate() {
        let limiter = RateLimiter::new(5.0, None);
        let start = Instant::now();

        // Should allow exactly 5 requests
        for _ in 0..5 {
            assert!(limiter.allow_at(start).allowed);
        }

        // 6th request should be blocked
        assert!(!limiter.allow_at(start).allowed);

        // 0.2s later one token has been replenished
        let later = start + Duration::from_millis(200);
        assert!(limiter.allow_at(later).allowed);

        // But the next one should be blocked
        assert!(!limiter.allow_at(later).allowed);
    }

    #[test]
    fn test_rate_limiter_single_token() {
        let limiter = RateLimiter::new(1.0, None);
        let start = Instant::now();

        let first = limiter.allow_at(start);
        assert!(first.allowed);
        assert_eq!(first.effective_rate, 1.0);

        let second = limiter.allow_at(start + Duration::from_millis(10));
        assert!(!second.allowed);
        assert_eq!(second.effective_rate, 0.5);

        let third = limiter.allow_at(start + Duration::from_millis(20));
        assert!(!third.allowed);
        assert!((third.effective_rate - 1.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_rate_limiter_effective_rate() {
        let limiter = RateLimiter::new(50.0, None);
        let start = Instant::now();

        let mut allowed_count = 0;
        for _ in 0..100 {
            if limiter.allow_at(start).allowed {
                allowed_count += 1;
            }
        }

        assert_eq!(allowed_count, 50);

        let rate = limiter.effective_rate();
        assert!(
            (0.45..=0.55).contains(&rate),
            "Expected rate around 0.5, got {}",
            rate
        );
    }

    #[test]
    fn test_rate_limiter_window_rollover() {
        let limiter = RateLimiter::new(1.0, None);
        let start = Instant::now();

        assert!(limiter.allow_at(start).allowed);
        assert!(!limiter.allow_at(start).allowed);

        // Next window: a token is available again, and the previous window's
        // rate is averaged into the effective rate
        let next_window = start + Duration::from_secs(2);
        let allowed = limiter.allow_at(next_window);
        assert!(allowed.allowed);
        assert_eq!(allowed.effective_rate, (1.0 + 0.5) / 2.0);
    }

    #[test]
    fn test_rate_limiter_thread_safety() {
        let limiter = RateLimiter::new(100.0, None);
        let limiter_clone = limiter.clone();

        let handle = thread::spawn(move || {
            let mut allowed_count = 0;
            for _ in 0..100 {
                if limiter_clone.allow().allowed {
                    allowed_count += 1;
                }
            }
            allowed_count
        });

        let mut main_allowed_count = 0;
        for _ in 0..100 {
            if limiter.allow().allowed {
                main_allowed_count += 1;
            }
        }

        let thread_allowed_count = handle.join().unwrap();

        let total_allowed = main_allowed_count + thread_allowed_count;
        assert!(
            (95..=105).contains(&total_allowed),
            "Expected around 100 allowed requests, got {}",
            total_allowed
        );
    }
}
