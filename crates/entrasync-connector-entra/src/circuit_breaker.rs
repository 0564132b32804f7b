//! Circuit breaker for sustained Graph throttling.
//!
//! Failures are counted in a sliding window. Once the window holds
//! `failure_threshold` failures the breaker opens and rejects requests until
//! `open_duration` has passed, then lets a single probe through.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CircuitBreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    failure_threshold: u32,
    failure_window: Duration,
    open_duration: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, failure_window: Duration, open_duration: Duration) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            probe_in_flight: false,
            failure_threshold: failure_threshold.max(1),
            failure_window,
            open_duration,
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }

    /// Failures currently inside the window.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether a request may be sent now.
    ///
    /// In half-open state only one probe is admitted until it reports back.
    pub fn should_allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                let elapsed = self.opened_at.map_or(self.open_duration, |t| t.elapsed());
                if elapsed >= self.open_duration {
                    self.state = CircuitBreakerState::HalfOpen;
                    self.probe_in_flight = true;
                    info!("Circuit breaker half-open, sending probe");
                    true
                } else {
                    false
                }
            }
            CircuitBreakerState::HalfOpen => {
                if self.probe_in_flight {
                    false
                } else {
                    self.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();
        match self.state {
            CircuitBreakerState::Closed => {
                self.failures.push_back(now);
                self.evict_expired(now);
                if self.failures.len() >= self.failure_threshold as usize {
                    warn!(failures = self.failures.len(), "Circuit breaker opened");
                    self.open(now);
                }
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker probe failed, reopening");
                self.open(now);
            }
            CircuitBreakerState::Open => {}
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitBreakerState::HalfOpen {
            info!("Circuit breaker closed after successful probe");
        }
        self.state = CircuitBreakerState::Closed;
        self.failures.clear();
        self.opened_at = None;
        self.probe_in_flight = false;
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitBreakerState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
        self.failures.clear();
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) > self.failure_window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}
