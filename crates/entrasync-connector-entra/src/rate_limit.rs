//! Backoff for throttled and transiently failing Graph requests.
//!
//! 429 responses wait for `Retry-After` when present, otherwise
//! `base * 2^attempt`; 502/503/504 always use the exponential delay. Every
//! wait gets up to `jitter_factor` of random extra delay. Both kinds of
//! failure feed the circuit breaker, so a tenant that keeps throttling us
//! fails fast instead of retrying forever.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerState};
use crate::metrics::RateLimitMetrics;
use crate::{EntraError, EntraResult};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base delay for exponential backoff in milliseconds (default: 1000ms).
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 300000ms = 5 minutes).
    pub max_delay_ms: u64,
    /// Jitter factor as a fraction of delay (default: 0.25 = 25%).
    pub jitter_factor: f64,
    /// Maximum retry attempts for throttled requests (default: 10).
    pub max_retries: u32,
    pub circuit_failure_threshold: u32,
    pub circuit_failure_window_secs: u64,
    pub circuit_open_duration_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 300_000,
            jitter_factor: 0.25,
            max_retries: 10,
            circuit_failure_threshold: 10,
            circuit_failure_window_secs: 300,
            circuit_open_duration_secs: 30,
        }
    }
}

impl RateLimitConfig {
    /// Short delays for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter_factor: 0.25,
            max_retries: 3,
            circuit_failure_threshold: 50,
            circuit_failure_window_secs: 60,
            circuit_open_duration_secs: 1,
        }
    }

    pub fn validate(&self) -> EntraResult<()> {
        if self.base_delay_ms == 0 {
            return Err(EntraError::Config("base_delay_ms must be > 0".to_string()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(EntraError::Config(
                "max_delay_ms must be >= base_delay_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(EntraError::Config(
                "jitter_factor must be in range [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    throttled_until: Mutex<Option<Instant>>,
    circuit_breaker: Mutex<CircuitBreaker>,
    metrics: Mutex<RateLimitMetrics>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> EntraResult<Self> {
        config.validate()?;
        let circuit_breaker = CircuitBreaker::new(
            config.circuit_failure_threshold,
            Duration::from_secs(config.circuit_failure_window_secs),
            Duration::from_secs(config.circuit_open_duration_secs),
        );
        Ok(Self {
            config,
            throttled_until: Mutex::new(None),
            circuit_breaker: Mutex::new(circuit_breaker),
            metrics: Mutex::new(RateLimitMetrics::default()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Gate a request: fail fast when the circuit is open, otherwise wait
    /// out any `Retry-After` another request already received.
    pub async fn before_request(&self) -> EntraResult<()> {
        if !self.circuit_breaker.lock().await.should_allow_request() {
            self.metrics.lock().await.circuit_rejects += 1;
            return Err(EntraError::CircuitOpen);
        }

        let until = *self.throttled_until.lock().await;
        if let Some(until) = until {
            let now = Instant::now();
            if until > now {
                debug!(wait_ms = (until - now).as_millis() as u64, "Waiting out Retry-After");
                tokio::time::sleep(until - now).await;
            }
        }
        Ok(())
    }

    /// Parses a `Retry-After` header given in seconds. HTTP-date values are
    /// not supported and fall back to exponential backoff.
    #[must_use]
    pub fn parse_retry_after(header_value: &str) -> Option<u64> {
        header_value.trim().parse::<u64>().ok()
    }

    /// `base * 2^attempt`, capped at `max_delay_ms`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.min(32));
        let delay_ms = self
            .config
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Adds between zero and `jitter_factor * delay` extra.
    #[must_use]
    pub fn with_jitter(&self, delay: Duration) -> Duration {
        use rand::Rng;

        let delay_ms = delay.as_millis() as f64;
        let jitter_range = delay_ms * self.config.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(0.0..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    /// Handle a 429. Returns once the caller may retry, or an error when
    /// retries are exhausted or the circuit opened.
    pub async fn on_throttled(&self, retry_after: Option<&str>, attempt: u32) -> EntraResult<()> {
        self.metrics.lock().await.rate_limited_count += 1;
        self.record_failure().await?;

        if attempt >= self.config.max_retries {
            return Err(EntraError::MaxRetriesExceeded { attempts: attempt });
        }

        let delay = match retry_after.and_then(Self::parse_retry_after) {
            Some(secs) => {
                let capped = Duration::from_secs(secs).min(Duration::from_millis(self.config.max_delay_ms));
                *self.throttled_until.lock().await = Some(Instant::now() + capped);
                capped
            }
            None => self.backoff_delay(attempt),
        };
        self.wait(delay, attempt, "Rate limited").await;
        Ok(())
    }

    /// Handle a 502/503/504 with the caller's own retry limit.
    pub async fn on_transient(&self, status: u16, attempt: u32, max_retries: u32) -> EntraResult<()> {
        self.metrics.lock().await.transient_error_count += 1;
        self.record_failure().await?;

        if attempt >= max_retries {
            return Err(EntraError::MaxRetriesExceeded { attempts: attempt });
        }
        debug!(status, "Transient Graph error");
        self.wait(self.backoff_delay(attempt), attempt, "Transient error")
            .await;
        Ok(())
    }

    pub async fn on_success(&self) {
        self.circuit_breaker.lock().await.record_success();
        *self.throttled_until.lock().await = None;
        self.metrics.lock().await.total_requests += 1;
    }

    pub async fn circuit_state(&self) -> CircuitBreakerState {
        self.circuit_breaker.lock().await.state()
    }

    /// Snapshot of the counters.
    pub async fn metrics(&self) -> RateLimitMetrics {
        let mut metrics = self.metrics.lock().await.clone();
        metrics.current_circuit_state = self.circuit_state().await;
        metrics
    }

    async fn record_failure(&self) -> EntraResult<()> {
        let mut cb = self.circuit_breaker.lock().await;
        let before = cb.state();
        cb.record_failure();
        if cb.state() == CircuitBreakerState::Open {
            if before != CircuitBreakerState::Open {
                self.metrics.lock().await.circuit_opens += 1;
            }
            return Err(EntraError::CircuitOpen);
        }
        Ok(())
    }

    async fn wait(&self, delay: Duration, attempt: u32, reason: &str) {
        let delay = self.with_jitter(delay);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "{reason}, backing off"
        );
        self.metrics
            .lock()
            .await
            .record_retry(delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
    }
}
