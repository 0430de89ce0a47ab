/// Per-endpoint circuit breaker (SPEC_FULL.md §B), grounded in the
/// teacher's `core/circuit_breaker.rs` `RpcCircuitBreaker`. Independent of
/// `RpcEndpoint`'s health score: the score governs weighted selection
/// among otherwise-usable endpoints, while the breaker is a hard trip
/// switch that sheds all load from an endpoint on a sustained failure
/// streak and only resumes probing it after a cooldown.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const FAILURE_THRESHOLD: u64 = 5;
const COOLDOWN: Duration = Duration::from_secs(30);
const HALF_OPEN_SUCCESSES_TO_CLOSE: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_metric_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

pub struct RpcCircuitBreaker {
    label: String,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicU64,
    half_open_successes: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
}

impl RpcCircuitBreaker {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU64::new(0),
            half_open_successes: AtomicU64::new(0),
            opened_at: RwLock::new(None),
        }
    }

    /// Transitions Open -> HalfOpen once the cooldown has elapsed, then
    /// reports whether a call may currently proceed.
    pub async fn allow(&self) -> bool {
        let mut state = self.state.write().await;
        if *state == CircuitState::Open {
            if let Some(opened_at) = *self.opened_at.read().await {
                if opened_at.elapsed() >= COOLDOWN {
                    *state = CircuitState::HalfOpen;
                    self.half_open_successes.store(0, Ordering::Relaxed);
                    crate::metrics::CIRCUIT_BREAKER_STATE
                        .with_label_values(&[&self.label])
                        .set(CircuitState::HalfOpen.as_metric_value());
                    tracing::info!(endpoint = %self.label, "circuit breaker half-open");
                }
            }
        }
        *state != CircuitState::Open
    }

    pub async fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= HALF_OPEN_SUCCESSES_TO_CLOSE {
                *state = CircuitState::Closed;
                crate::metrics::CIRCUIT_BREAKER_STATE
                    .with_label_values(&[&self.label])
                    .set(CircuitState::Closed.as_metric_value());
                tracing::info!(endpoint = %self.label, "circuit breaker closed");
            }
        }
    }

    pub async fn on_failure(&self) {
        let mut state = self.state.write().await;

        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
            crate::metrics::CIRCUIT_BREAKER_TRIPS.with_label_values(&[&self.label]).inc();
            crate::metrics::CIRCUIT_BREAKER_STATE
                .with_label_values(&[&self.label])
                .set(CircuitState::Open.as_metric_value());
            tracing::warn!(endpoint = %self.label, "circuit breaker re-opened during half-open trial");
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= FAILURE_THRESHOLD && *state == CircuitState::Closed {
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
            crate::metrics::CIRCUIT_BREAKER_TRIPS.with_label_values(&[&self.label]).inc();
            crate::metrics::CIRCUIT_BREAKER_STATE
                .with_label_values(&[&self.label])
                .set(CircuitState::Open.as_metric_value());
            tracing::warn!(
                endpoint = %self.label,
                failures,
                "circuit breaker opened after sustained failure streak"
            );
        }
    }

    #[cfg(test)]
    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }
}

pub fn new_breaker(label: &str) -> Arc<RpcCircuitBreaker> {
    Arc::new(RpcCircuitBreaker::new(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trips_open_after_threshold_consecutive_failures() {
        let breaker = RpcCircuitBreaker::new("test");
        for _ in 0..FAILURE_THRESHOLD {
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert!(!breaker.allow().await);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failure_streak() {
        let breaker = RpcCircuitBreaker::new("test");
        for _ in 0..FAILURE_THRESHOLD - 1 {
            breaker.on_failure().await;
        }
        breaker.on_success().await;
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = RpcCircuitBreaker::new("test");
        for _ in 0..FAILURE_THRESHOLD {
            breaker.on_failure().await;
        }
        // Force state to half-open directly, since the cooldown is 30s.
        *breaker.state.write().await = CircuitState::HalfOpen;
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }
}
