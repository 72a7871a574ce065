//! Destination health state machine.
//!
//! # States
//! - Unknown: never probed; still receives traffic
//! - Healthy: receives traffic
//! - Unhealthy: excluded from load balancing
//!
//! # State Transitions
//! ```text
//! Unknown → Healthy/Unhealthy: first active probe result
//! Healthy → Unhealthy: consecutive probe failures >= unhealthy_threshold
//! Unhealthy → Healthy: consecutive probe successes >= healthy_threshold
//! Any → Unhealthy: consecutive forward failures >= passive_failure_threshold
//! Unhealthy → Unknown: passive demotion aged past reactivation period
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Counters reset on state transition
//! - Writers are confined to the health module; readers only load atomics

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::HealthCheckConfig;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A state change, returned so callers can log and export it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

/// Health bookkeeping for one destination.
#[derive(Debug)]
pub struct DestinationHealth {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    passive_failures: AtomicU32,
    /// Millis since `epoch()` at which a passive demotion happened, 0 if none.
    passively_demoted_at: AtomicU64,
    last_latency_us: AtomicU64,
}

impl Default for DestinationHealth {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            passive_failures: AtomicU32::new(0),
            passively_demoted_at: AtomicU64::new(0),
            last_latency_us: AtomicU64::new(0),
        }
    }
}

impl DestinationHealth {
    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    /// Healthy or not yet known.
    pub fn is_available(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    /// Latency of the last forwarded attempt.
    pub fn last_latency(&self) -> Duration {
        Duration::from_micros(self.last_latency_us.load(Ordering::Relaxed))
    }

    fn set_state(&self, to: HealthState) -> Option<Transition> {
        let from = HealthState::from(self.state.swap(to as u8, Ordering::AcqRel));
        if from == to {
            return None;
        }
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.passive_failures.store(0, Ordering::Relaxed);
        if to != HealthState::Unhealthy {
            self.passively_demoted_at.store(0, Ordering::Relaxed);
        }
        Some(Transition { from, to })
    }

    /// Apply an active probe result.
    pub(crate) fn record_probe(&self, success: bool, config: &HealthCheckConfig) -> Option<Transition> {
        let current = self.state();

        if success {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            match current {
                HealthState::Unknown => self.set_state(HealthState::Healthy),
                HealthState::Unhealthy if successes >= config.healthy_threshold => {
                    self.set_state(HealthState::Healthy)
                }
                _ => None,
            }
        } else {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            match current {
                HealthState::Unknown => self.set_state(HealthState::Unhealthy),
                HealthState::Healthy if failures >= config.unhealthy_threshold => {
                    self.set_state(HealthState::Unhealthy)
                }
                _ => None,
            }
        }
    }

    /// Apply the outcome of a forwarded request.
    pub(crate) fn record_forward(
        &self,
        success: bool,
        latency: Duration,
        config: &HealthCheckConfig,
    ) -> Option<Transition> {
        self.last_latency_us
            .store(latency.as_micros().min(u64::MAX as u128) as u64, Ordering::Relaxed);

        if !config.passive {
            return None;
        }

        if success {
            self.passive_failures.store(0, Ordering::Relaxed);
            return None;
        }

        let failures = self.passive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= config.passive_failure_threshold && self.state() != HealthState::Unhealthy {
            let transition = self.set_state(HealthState::Unhealthy);
            self.passively_demoted_at.store(now_millis().max(1), Ordering::Relaxed);
            return transition;
        }
        None
    }

    /// Return a passively demoted destination to Unknown once the
    /// reactivation period has elapsed.
    pub(crate) fn try_reactivate(&self, reactivation: Duration) -> Option<Transition> {
        let demoted_at = self.passively_demoted_at.load(Ordering::Relaxed);
        if demoted_at == 0 || self.state() != HealthState::Unhealthy {
            return None;
        }
        let elapsed = now_millis().saturating_sub(demoted_at);
        if elapsed < reactivation.as_millis() as u64 {
            return None;
        }
        self.set_state(HealthState::Unknown)
    }
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn now_millis() -> u64 {
    epoch().elapsed().as_millis() as u64
}
