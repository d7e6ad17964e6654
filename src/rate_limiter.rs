//! Rate limiter for setting source calls
//!
//! Token buckets over two windows bound how hard the engine hits the
//! platform's admin API. Unlike a hard quota, `acquire` waits for capacity
//! so a throttled run slows down instead of failing scopes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum calls per minute
    pub max_requests_per_minute: u32,
    /// Maximum calls per hour
    pub max_requests_per_hour: u32,
    /// Whether to enable rate limiting (can be disabled for testing)
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 600,
            max_requests_per_hour: 20_000,
            enabled: true,
        }
    }
}

impl RateLimiterConfig {
    /// Per-minute cap with the hour window scaled to match
    pub fn per_minute(max_requests_per_minute: u32) -> Self {
        Self {
            max_requests_per_minute,
            max_requests_per_hour: max_requests_per_minute.saturating_mul(60),
            enabled: true,
        }
    }
}

/// Token bucket for rate limiting
struct TokenBucket {
    /// Maximum tokens in bucket
    capacity: u32,
    /// Current tokens available
    tokens: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
    /// Refill rate (tokens per second)
    refill_rate: f64,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            last_refill: Instant::now(),
            refill_rate,
        }
    }

    fn consume(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Time until one token is available, `None` if one is available now
    fn time_until_available(&mut self) -> Option<Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            None
        } else if self.refill_rate <= 0.0 {
            Some(Duration::from_secs(60))
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(tokens_needed / self.refill_rate))
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;
    }
}

struct Buckets {
    minute: TokenBucket,
    hour: TokenBucket,
}

/// Rate limiter over a minute and an hour window
pub struct RateLimiter {
    buckets: Arc<Mutex<Buckets>>,
    config: RateLimiterConfig,
    total_calls: Arc<Mutex<u64>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }

    pub fn with_config(config: RateLimiterConfig) -> Self {
        let minute_rate = config.max_requests_per_minute as f64 / 60.0;
        let hour_rate = config.max_requests_per_hour as f64 / 3600.0;

        Self {
            buckets: Arc::new(Mutex::new(Buckets {
                minute: TokenBucket::new(config.max_requests_per_minute, minute_rate),
                hour: TokenBucket::new(config.max_requests_per_hour, hour_rate),
            })),
            config,
            total_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Consume a token if one is available in every window
    pub async fn try_acquire(&self) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut buckets = self.buckets.lock().await;
        let minute_wait = buckets.minute.time_until_available();
        let hour_wait = buckets.hour.time_until_available();

        if let Some(wait) = [minute_wait, hour_wait].into_iter().flatten().max() {
            let limit_type = if minute_wait.is_some() { "minute" } else { "hour" };
            return Err(RateLimitError::RateLimitExceeded {
                wait,
                limit_type: limit_type.to_string(),
            });
        }

        buckets.minute.consume();
        buckets.hour.consume();
        drop(buckets);

        *self.total_calls.lock().await += 1;
        Ok(())
    }

    /// Wait until a token is available, then consume it
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(()) => return,
                Err(RateLimitError::RateLimitExceeded { wait, limit_type }) => {
                    tracing::debug!(?wait, %limit_type, "Rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub async fn get_stats(&self) -> RateLimiterStats {
        let buckets = self.buckets.lock().await;
        let total = self.total_calls.lock().await;

        RateLimiterStats {
            minute_tokens_available: buckets.minute.tokens as u32,
            hour_tokens_available: buckets.hour.tokens as u32,
            total_calls: *total,
        }
    }

    /// Reset rate limiter (useful for testing)
    pub async fn reset(&self) {
        let mut buckets = self.buckets.lock().await;
        buckets.minute.tokens = buckets.minute.capacity as f64;
        buckets.hour.tokens = buckets.hour.capacity as f64;
        *self.total_calls.lock().await = 0;
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub minute_tokens_available: u32,
    pub hour_tokens_available: u32,
    pub total_calls: u64,
}

/// Rate limit errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded for {limit_type}. Next call allowed in {wait:?}.")]
    RateLimitExceeded { wait: Duration, limit_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_minute: u32, per_hour: u32) -> RateLimiterConfig {
        RateLimiterConfig {
            max_requests_per_minute: per_minute,
            max_requests_per_hour: per_hour,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_initial_requests() {
        let limiter = RateLimiter::with_config(config(5, 10));

        for _ in 0..5 {
            assert!(limiter.try_acquire().await.is_ok());
        }

        assert!(limiter.try_acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::with_config(RateLimiterConfig {
            enabled: false,
            ..config(1, 1)
        });

        for _ in 0..10 {
            assert!(limiter.try_acquire().await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_stats() {
        let limiter = RateLimiter::with_config(config(5, 10));

        for _ in 0..3 {
            let _ = limiter.try_acquire().await;
        }

        let stats = limiter.get_stats().await;
        assert_eq!(stats.total_calls, 3);
        assert!(stats.minute_tokens_available <= 2);

        limiter.reset().await;
        assert_eq!(limiter.get_stats().await.total_calls, 0);
    }

    #[tokio::test]
    async fn test_hour_window_reported() {
        let limiter = RateLimiter::with_config(config(10, 1));
        limiter.try_acquire().await.unwrap();

        match limiter.try_acquire().await {
            Err(RateLimitError::RateLimitExceeded { limit_type, .. }) => assert_eq!(limit_type, "hour"),
            Ok(()) => panic!("expected hour window to block"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        // 600/min refills one token every 100ms
        let limiter = RateLimiter::with_config(config(600, 100_000));
        {
            let mut buckets = limiter.buckets.lock().await;
            buckets.minute.tokens = 0.0;
        }

        let started = tokio::time::Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(90));
        assert_eq!(limiter.get_stats().await.total_calls, 1);
    }

    #[test]
    fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(10, 10.0);
        bucket.tokens = 0.0;
        bucket.last_refill = Instant::now() - Duration::from_millis(100);

        bucket.refill();
        assert!(bucket.tokens >= 0.9 && bucket.tokens <= 1.1);
    }
}
