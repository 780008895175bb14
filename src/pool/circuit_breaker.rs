//! Circuit breaker guarding `launch` and the high-level acquire path
//! (design §4.C "Circuit breaker"), keyed per protected operation so the
//! executor can also use this type for the `actionKind|pageId` breaker in
//! phase 4 of the action pipeline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub rolling_window: Duration,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            rolling_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: VecDeque<Instant>,
    success_count: u64,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            success_count: 0,
            opened_at: None,
            half_open_probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Call before attempting the protected operation. `Err` means fail
    /// fast without invoking the operation (invariant 7).
    pub fn check(&mut self) -> Result<(), crate::error::ErrorKind> {
        match self.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= self.config.open_duration {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_probe_in_flight = true;
                    Ok(())
                } else {
                    Err(crate::error::ErrorKind::Unavailable(
                        "circuit breaker open".into(),
                    ))
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_probe_in_flight {
                    Err(crate::error::ErrorKind::Unavailable(
                        "circuit breaker half-open probe in flight".into(),
                    ))
                } else {
                    self.half_open_probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.failures.clear();
        self.half_open_probe_in_flight = false;
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.failures.push_back(now);
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > self.config.rolling_window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.half_open_probe_in_flight = false;

        if self.state == CircuitState::HalfOpen
            || self.failures.len() as u32 >= self.config.failure_threshold
        {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures_and_fails_fast() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            ..Default::default()
        });
        for _ in 0..5 {
            cb.check().unwrap();
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());
    }

    #[test]
    fn half_open_allows_one_probe_then_closes_on_success() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_millis(1),
            ..Default::default()
        });
        cb.check().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        cb.check().unwrap(); // transitions to half-open, consumes the probe slot
        assert!(cb.check().is_err()); // second concurrent caller is rejected
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_millis(1),
            ..Default::default()
        });
        cb.check().unwrap();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        cb.check().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
