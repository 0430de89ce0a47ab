/// RPC load balancer and rate-limit fabric (spec §4.1).
///
/// Weighted selection across N heterogeneous endpoints with health
/// scoring, exponential backoff with jitter, and per-endpoint failure
/// accounting. Grounded in the teacher's `core/rpc_client.rs` retry loop
/// and `core/circuit_breaker.rs` per-resource locking, generalised from a
/// single endpoint to a weighted pool.
use crate::core::config::{EngineConfig, RpcEndpointConfig};
use crate::core::errors::{EngineError, Result};
use crate::rpc::circuit_breaker::RpcCircuitBreaker;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const HEALTHY_THRESHOLD: i32 = 50;

/// Mutable per-endpoint health state, behind its own lock so concurrent
/// selections across unrelated endpoints never contend.
struct EndpointState {
    score: i32,
    next_allowed: Instant,
}

pub struct RpcEndpoint {
    pub url: String,
    pub label: String,
    pub weight: u32,
    fail_count: AtomicU64,
    state: Mutex<EndpointState>,
    breaker: Arc<RpcCircuitBreaker>,
}

impl RpcEndpoint {
    fn new(cfg: &RpcEndpointConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            label: cfg.label.clone(),
            weight: cfg.weight.clamp(1, 100),
            fail_count: AtomicU64::new(0),
            state: Mutex::new(EndpointState {
                score: 100,
                next_allowed: Instant::now(),
            }),
            breaker: crate::rpc::circuit_breaker::new_breaker(&cfg.label),
        }
    }

    /// Independent safety valve over the health score (SPEC_FULL.md §B):
    /// sustained failure streaks trip the breaker open and shed all load
    /// from this endpoint for a cooldown window, regardless of score.
    pub async fn circuit_allows(&self) -> bool {
        self.breaker.allow().await
    }

    pub async fn score(&self) -> i32 {
        self.state.lock().await.score
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_count.load(Ordering::Relaxed)
    }

    async fn record_success(&self) {
        let mut s = self.state.lock().await;
        s.score = (s.score + 5).min(100);
        crate::metrics::RPC_ENDPOINT_SCORE
            .with_label_values(&[&self.label])
            .set(s.score as f64);
        self.breaker.on_success().await;
    }

    async fn record_failure(&self, backoff_until: Option<Instant>) {
        let mut s = self.state.lock().await;
        s.score = (s.score - 20).max(0);
        if let Some(until) = backoff_until {
            s.next_allowed = until;
        }
        let fails = self.fail_count.fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::RPC_ENDPOINT_SCORE
            .with_label_values(&[&self.label])
            .set(s.score as f64);
        crate::metrics::RPC_ENDPOINT_FAIL_COUNT
            .with_label_values(&[&self.label])
            .set(fails as f64);
        self.breaker.on_failure().await;
    }

    async fn reset(&self) {
        let mut s = self.state.lock().await;
        s.score = 100;
        crate::metrics::RPC_ENDPOINT_SCORE
            .with_label_values(&[&self.label])
            .set(100.0);
    }

    async fn respects_backoff(&self) -> bool {
        Instant::now() >= self.state.lock().await.next_allowed
    }
}

/// Outcome a caller reports back to the balancer after issuing a call
/// against a selected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    /// HTTP 5xx, timeout, connection refused.
    HardFailure,
    /// HTTP 429 or a provider-specific rate-limit signal.
    SoftFailure,
}

pub struct RpcBalancer {
    endpoints: Vec<Arc<RpcEndpoint>>,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    jitter: f64,
}

impl RpcBalancer {
    pub fn new(config: &EngineConfig) -> Self {
        let endpoints = config.rpc_endpoints.iter().map(|e| Arc::new(RpcEndpoint::new(e))).collect();
        Self {
            endpoints,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
            jitter: config.jitter,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Weighted selection over endpoints with `score > 50` and whose
    /// backoff window has elapsed. Falls back to a full score reset and a
    /// single retry if every endpoint is currently unhealthy.
    pub async fn select(&self) -> Result<Arc<RpcEndpoint>> {
        if let Some(ep) = self.select_once().await {
            return Ok(ep);
        }

        tracing::warn!("all RPC endpoints unhealthy, resetting scores");
        for ep in &self.endpoints {
            ep.reset().await;
        }

        self.select_once().await.ok_or(EngineError::AllEndpointsFailed)
    }

    async fn select_once(&self) -> Option<Arc<RpcEndpoint>> {
        let mut healthy = Vec::new();
        for ep in &self.endpoints {
            if ep.score().await > HEALTHY_THRESHOLD
                && ep.respects_backoff().await
                && ep.circuit_allows().await
            {
                healthy.push(ep.clone());
            }
        }
        if healthy.is_empty() {
            return None;
        }

        let total_weight: u32 = healthy.iter().map(|e| e.weight).sum();
        let mut pick = rand::thread_rng().gen_range(0..total_weight);
        for ep in &healthy {
            if pick < ep.weight {
                return Some(ep.clone());
            }
            pick -= ep.weight;
        }
        healthy.into_iter().next()
    }

    /// Issue `op` against a freshly selected endpoint, retrying up to
    /// `2 * endpoint_count` times with exponential backoff and jitter on
    /// retryable failures. `op` reports its own outcome via the returned
    /// `CallOutcome` so the balancer can update health scores.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<RpcEndpoint>) -> Fut,
        Fut: std::future::Future<Output = (Result<T>, CallOutcome)>,
    {
        let max_attempts = (2 * self.endpoint_count().max(1)) as u32;
        let mut attempt = 0u32;

        loop {
            let endpoint = self.select().await?;
            let (result, outcome) = op(endpoint.clone()).await;

            match outcome {
                CallOutcome::Success => {
                    endpoint.record_success().await;
                    return result;
                }
                CallOutcome::HardFailure => {
                    endpoint.record_failure(None).await;
                }
                CallOutcome::SoftFailure => {
                    let backoff = self.backoff_duration(attempt);
                    endpoint.record_failure(Some(Instant::now() + backoff)).await;
                }
            }

            attempt += 1;
            if attempt >= max_attempts {
                return Err(EngineError::AllEndpointsFailed);
            }

            sleep(self.backoff_duration(attempt)).await;
        }
    }

    /// 500ms -> 1s -> 2s -> 4s ... capped at `backoff_max_ms`, +/- jitter.
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base_ms.saturating_mul(1u64 << attempt.min(10));
        let capped = exp.min(self.backoff_max_ms);
        let jitter_span = (capped as f64 * self.jitter) as i64;
        let delta = if jitter_span > 0 {
            rand::thread_rng().gen_range(-jitter_span..=jitter_span)
        } else {
            0
        };
        let millis = (capped as i64 + delta).max(0) as u64;
        Duration::from_millis(millis)
    }

    /// Background heartbeat: ping every endpoint once per `interval` with
    /// a lightweight call, adjusting scores only. Never emits externally.
    pub async fn heartbeat_once<F, Fut>(&self, mut ping: F)
    where
        F: FnMut(Arc<RpcEndpoint>) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for endpoint in &self.endpoints {
            if ping(endpoint.clone()).await {
                endpoint.record_success().await;
            } else {
                endpoint.record_failure(None).await;
            }
        }
    }

    pub fn endpoints(&self) -> &[Arc<RpcEndpoint>] {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;

    #[tokio::test]
    async fn select_picks_a_healthy_endpoint() {
        let config = EngineConfig::for_test();
        let balancer = RpcBalancer::new(&config);
        let ep = balancer.select().await.unwrap();
        assert_eq!(ep.label, "test");
    }

    #[tokio::test]
    async fn repeated_hard_failures_drop_score_and_exclude_endpoint() {
        let config = EngineConfig::for_test();
        let balancer = RpcBalancer::new(&config);
        let ep = balancer.endpoints()[0].clone();
        for _ in 0..3 {
            ep.record_failure(None).await;
        }
        assert_eq!(ep.score().await, 40);
        // Only endpoint is now unhealthy -> select() resets and retries.
        let reselected = balancer.select().await.unwrap();
        assert_eq!(reselected.score().await, 100);
    }

    #[tokio::test]
    async fn sustained_failure_streak_trips_breaker_and_excludes_endpoint_even_after_score_reset() {
        let config = EngineConfig::for_test();
        let balancer = RpcBalancer::new(&config);
        let ep = balancer.endpoints()[0].clone();
        for _ in 0..5 {
            ep.record_failure(None).await;
        }
        assert!(!ep.circuit_allows().await);
        // A score reset (the only-endpoint-unhealthy fallback) does not
        // override the breaker; the endpoint stays excluded until the
        // breaker's own cooldown elapses.
        ep.reset().await;
        assert!(!ep.circuit_allows().await);
        assert!(matches!(balancer.select().await, Err(EngineError::AllEndpointsFailed)));
    }

    #[tokio::test]
    async fn success_increments_score_capped_at_100() {
        let config = EngineConfig::for_test();
        let balancer = RpcBalancer::new(&config);
        let ep = balancer.endpoints()[0].clone();
        ep.record_success().await;
        assert_eq!(ep.score().await, 100);
    }

    #[test]
    fn backoff_schedule_grows_and_caps() {
        let config = EngineConfig::for_test();
        let balancer = RpcBalancer::new(&config);
        let d0 = balancer.backoff_duration(0).as_millis() as i64;
        let d5 = balancer.backoff_duration(5).as_millis() as i64;
        assert!(d0 <= 600 && d0 >= 400);
        assert!(d5 as u64 <= balancer.backoff_max_ms + (balancer.backoff_max_ms as f64 * balancer.jitter) as u64);
    }
}
