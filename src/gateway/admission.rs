//! Ingress admission control
//!
//! Two gates guard the publish path: a bounded in-flight counter and a
//! three-state circuit breaker. Both update without holding anything across
//! I/O; the in-flight permit is released on every exit path when it drops.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::AdmissionArgs;
use crate::types::{Result, WeirError};

/// Circuit breaker state as reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Breaker {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

/// How a request passed the breaker gate. Probes carry the half-open
/// verdict: their outcome alone decides whether the circuit closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    Normal,
    Probe,
}

/// An admitted request. Holds the in-flight permit for the duration of the
/// publish; dropping it releases the slot.
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    pub kind: Admitted,
}

/// Snapshot of admission state for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionMetrics {
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
}

/// Admission gate shared by all gateway request handlers
pub struct AdmissionControl {
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    breaker: Mutex<Breaker>,
    threshold: u32,
    reset: Duration,
}

impl AdmissionControl {
    pub fn new(args: &AdmissionArgs) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(args.max_in_flight)),
            max_in_flight: args.max_in_flight,
            breaker: Mutex::new(Breaker::Closed {
                consecutive_failures: 0,
            }),
            threshold: args.breaker_threshold,
            reset: args.breaker_reset(),
        }
    }

    /// Acquire an admission permit or reject the request
    pub fn try_admit(&self) -> Result<Permit> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(p) => p,
            Err(TryAcquireError::NoPermits) => return Err(WeirError::Backpressure),
            Err(TryAcquireError::Closed) => {
                return Err(WeirError::Internal("Admission semaphore closed".into()))
            }
        };

        // An early return drops the permit, releasing the in-flight slot.
        let kind = self.check_breaker()?;
        Ok(Permit {
            _permit: permit,
            kind,
        })
    }

    fn check_breaker(&self) -> Result<Admitted> {
        let mut breaker = self.lock_breaker();
        match &*breaker {
            Breaker::Closed { .. } => Ok(Admitted::Normal),
            Breaker::Open { opened_at } if opened_at.elapsed() < self.reset => {
                Err(WeirError::CircuitOpen)
            }
            // Reset window elapsed: exactly one probe goes through.
            Breaker::Open { .. } => {
                *breaker = Breaker::HalfOpen;
                Ok(Admitted::Probe)
            }
            Breaker::HalfOpen => Err(WeirError::CircuitOpen),
        }
    }

    /// Report the publish outcome for breaker accounting
    pub fn record(&self, kind: Admitted, success: bool) {
        let mut breaker = self.lock_breaker();
        match (&mut *breaker, kind, success) {
            (Breaker::HalfOpen, Admitted::Probe, true) => {
                *breaker = Breaker::Closed {
                    consecutive_failures: 0,
                };
            }
            (Breaker::HalfOpen, Admitted::Probe, false) => {
                *breaker = Breaker::Open {
                    opened_at: Instant::now(),
                };
            }
            (Breaker::Closed { consecutive_failures }, _, true) => {
                *consecutive_failures = 0;
            }
            (Breaker::Closed { consecutive_failures }, _, false) => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.threshold {
                    *breaker = Breaker::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            // Late outcomes from requests admitted before a state change
            // carry no information about the current state.
            _ => {}
        }
    }

    /// Number of publishes currently in flight
    pub fn in_flight(&self) -> usize {
        self.max_in_flight
            .saturating_sub(self.permits.available_permits())
    }

    /// Snapshot for health reporting
    pub fn metrics(&self) -> AdmissionMetrics {
        let breaker = self.lock_breaker();
        let (circuit_state, consecutive_failures) = match &*breaker {
            Breaker::Closed {
                consecutive_failures,
            } => (CircuitState::Closed, *consecutive_failures),
            Breaker::Open { .. } => (CircuitState::Open, self.threshold),
            Breaker::HalfOpen => (CircuitState::HalfOpen, self.threshold),
        };
        AdmissionMetrics {
            in_flight: self.in_flight(),
            max_in_flight: self.max_in_flight,
            circuit_state,
            consecutive_failures,
        }
    }

    fn lock_breaker(&self) -> std::sync::MutexGuard<'_, Breaker> {
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(max_in_flight: usize, threshold: u32, reset: Duration) -> AdmissionControl {
        AdmissionControl::new(&AdmissionArgs {
            max_in_flight,
            breaker_threshold: threshold,
            breaker_reset_ms: reset.as_millis() as u64,
            publish_timeout_ms: 5000,
        })
    }

    #[test]
    fn test_in_flight_cap_rejects_at_boundary() {
        let control = control(2, 5, Duration::from_secs(10));

        let first = control.try_admit().unwrap();
        let second = control.try_admit().unwrap();
        assert_eq!(control.in_flight(), 2);

        assert!(matches!(
            control.try_admit(),
            Err(WeirError::Backpressure)
        ));

        drop(second);
        assert!(control.try_admit().is_ok());
        drop(first);
    }

    #[test]
    fn test_permit_released_on_every_exit_path() {
        let control = control(1, 5, Duration::from_secs(10));
        {
            let _permit = control.try_admit().unwrap();
            assert_eq!(control.in_flight(), 1);
        }
        assert_eq!(control.in_flight(), 0);
    }

    #[test]
    fn test_breaker_opens_exactly_at_threshold() {
        let control = control(8, 3, Duration::from_secs(10));

        for _ in 0..2 {
            let permit = control.try_admit().unwrap();
            control.record(permit.kind, false);
        }
        assert_eq!(control.metrics().circuit_state, CircuitState::Closed);
        assert_eq!(control.metrics().consecutive_failures, 2);

        let permit = control.try_admit().unwrap();
        control.record(permit.kind, false);
        assert_eq!(control.metrics().circuit_state, CircuitState::Open);

        assert!(matches!(control.try_admit(), Err(WeirError::CircuitOpen)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let control = control(8, 3, Duration::from_secs(10));

        let permit = control.try_admit().unwrap();
        control.record(permit.kind, false);
        let permit = control.try_admit().unwrap();
        control.record(permit.kind, true);

        assert_eq!(control.metrics().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let control = control(8, 1, Duration::from_millis(20));

        let permit = control.try_admit().unwrap();
        control.record(permit.kind, false);
        assert_eq!(control.metrics().circuit_state, CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));

        let probe = control.try_admit().unwrap();
        assert_eq!(probe.kind, Admitted::Probe);
        // A concurrent request during the probe is rejected.
        assert!(matches!(control.try_admit(), Err(WeirError::CircuitOpen)));

        control.record(probe.kind, true);
        assert_eq!(control.metrics().circuit_state, CircuitState::Closed);
        assert!(control.try_admit().is_ok());
    }

    #[test]
    fn test_failed_probe_reopens_with_fresh_window() {
        let control = control(8, 1, Duration::from_millis(20));

        let permit = control.try_admit().unwrap();
        control.record(permit.kind, false);
        std::thread::sleep(Duration::from_millis(30));

        let probe = control.try_admit().unwrap();
        control.record(probe.kind, false);
        assert_eq!(control.metrics().circuit_state, CircuitState::Open);
        assert!(matches!(control.try_admit(), Err(WeirError::CircuitOpen)));

        // After another full window the next probe is admitted again.
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(control.try_admit().unwrap().kind, Admitted::Probe);
    }
}
