//! Request and throttling counters for the Graph client.

use serde::Serialize;

use crate::circuit_breaker::CircuitBreakerState;

/// Snapshot of Graph client counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RateLimitMetrics {
    /// Successful responses.
    pub total_requests: u64,
    /// 429 responses received.
    pub rate_limited_count: u64,
    /// 502/503/504 responses received.
    pub transient_error_count: u64,
    /// Retries actually performed after a wait.
    pub retry_count: u64,
    /// Times the circuit breaker opened.
    pub circuit_opens: u64,
    /// Requests refused while the circuit was open.
    pub circuit_rejects: u64,
    /// Circuit state when the snapshot was taken.
    #[serde(serialize_with = "serialize_state")]
    pub current_circuit_state: CircuitBreakerState,
    total_retry_delay_ms: u64,
}

fn serialize_state<S: serde::Serializer>(
    state: &CircuitBreakerState,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(state)
}

impl RateLimitMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_retry(&mut self, delay_ms: u64) {
        self.retry_count += 1;
        self.total_retry_delay_ms += delay_ms;
    }

    /// Average wait before a retry, in milliseconds.
    #[must_use]
    pub fn average_retry_delay_ms(&self) -> f64 {
        if self.retry_count == 0 {
            0.0
        } else {
            self.total_retry_delay_ms as f64 / self.retry_count as f64
        }
    }

    /// Share of requests that were throttled.
    #[must_use]
    pub fn rate_limit_ratio(&self) -> f64 {
        let attempts = self.total_requests + self.rate_limited_count;
        if attempts == 0 {
            0.0
        } else {
            self.rate_limited_count as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_retry_delay() {
        let mut metrics = RateLimitMetrics::new();
        assert_eq!(metrics.average_retry_delay_ms(), 0.0);

        metrics.record_retry(100);
        metrics.record_retry(200);
        metrics.record_retry(300);
        assert_eq!(metrics.retry_count, 3);
        assert_eq!(metrics.average_retry_delay_ms(), 200.0);
    }

    #[test]
    fn test_rate_limit_ratio() {
        let mut metrics = RateLimitMetrics::new();
        assert_eq!(metrics.rate_limit_ratio(), 0.0);

        metrics.total_requests = 8;
        metrics.rate_limited_count = 2;
        assert_eq!(metrics.rate_limit_ratio(), 0.2);
    }

    #[test]
    fn test_serializes_circuit_state_as_string() {
        let metrics = RateLimitMetrics {
            current_circuit_state: CircuitBreakerState::Open,
            ..Default::default()
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["current_circuit_state"], "open");
        assert!(json.get("total_retry_delay_ms").is_some());
    }
}
