use lazy_static::lazy_static;
/// Prometheus Metrics
/// Application monitoring and observability, adapted from the teacher's
/// `metrics/mod.rs` registry pattern to the detector/fusion/RPC-balancer
/// domain.
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // === HTTP surface ===

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).unwrap();

    // === RPC fabric ===

    pub static ref RPC_CALLS: CounterVec = CounterVec::new(
        Opts::new("rpc_calls_total", "Total RPC calls"),
        &["method", "outcome"]
    ).unwrap();

    pub static ref RPC_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rpc_duration_seconds", "RPC call duration")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method"]
    ).unwrap();

    pub static ref RPC_ENDPOINT_SCORE: GaugeVec = GaugeVec::new(
        Opts::new("rpc_endpoint_score", "Current health score per endpoint"),
        &["label"]
    ).unwrap();

    pub static ref RPC_ENDPOINT_FAIL_COUNT: GaugeVec = GaugeVec::new(
        Opts::new("rpc_endpoint_fail_count", "Monotonic failure count per endpoint"),
        &["label"]
    ).unwrap();

    pub static ref CIRCUIT_BREAKER_STATE: GaugeVec = GaugeVec::new(
        Opts::new("circuit_breaker_state", "0=closed, 1=open, 2=half-open"),
        &["label"]
    ).unwrap();

    pub static ref CIRCUIT_BREAKER_TRIPS: CounterVec = CounterVec::new(
        Opts::new("circuit_breaker_trips_total", "Times an endpoint's circuit breaker tripped open"),
        &["label"]
    ).unwrap();

    // === Detectors ===

    pub static ref DETECTOR_RUNS: CounterVec = CounterVec::new(
        Opts::new("detector_runs_total", "Total detector invocations"),
        &["detector", "outcome"]
    ).unwrap();

    pub static ref DETECTOR_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("detector_duration_seconds", "Detector execution duration")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["detector"]
    ).unwrap();

    pub static ref DETECTOR_PARTIAL_SCORE: HistogramVec = HistogramVec::new(
        HistogramOpts::new("detector_partial_score", "Partial score emitted per detector")
            .buckets(vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 80.0, 100.0]),
        &["detector"]
    ).unwrap();

    // === Fusion ===

    pub static ref ANALYSES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("analyses_total", "Total fused analyses"),
        &["risk_level"]
    ).unwrap();

    pub static ref ANALYSIS_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("analysis_duration_seconds", "End-to-end fused analysis duration")
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0])
    ).unwrap();

    pub static ref FUSION_CACHE_HITS: Counter = Counter::new(
        "fusion_cache_hits_total",
        "Analyses served from the dedup/cooldown cache"
    ).unwrap();

    pub static ref FUSION_COALESCED: Counter = Counter::new(
        "fusion_coalesced_requests_total",
        "Concurrent analysis requests that coalesced onto an in-flight one"
    ).unwrap();

    // === Exchange whitelist ===

    pub static ref EXCHANGE_AUTO_DETECTED: Counter = Counter::new(
        "exchange_auto_detected_total",
        "Addresses opportunistically promoted into the exchange whitelist"
    ).unwrap();

}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone())).unwrap();

    REGISTRY.register(Box::new(RPC_CALLS.clone())).unwrap();
    REGISTRY.register(Box::new(RPC_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(RPC_ENDPOINT_SCORE.clone())).unwrap();
    REGISTRY.register(Box::new(RPC_ENDPOINT_FAIL_COUNT.clone())).unwrap();
    REGISTRY.register(Box::new(CIRCUIT_BREAKER_STATE.clone())).unwrap();
    REGISTRY.register(Box::new(CIRCUIT_BREAKER_TRIPS.clone())).unwrap();

    REGISTRY.register(Box::new(DETECTOR_RUNS.clone())).unwrap();
    REGISTRY.register(Box::new(DETECTOR_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(DETECTOR_PARTIAL_SCORE.clone())).unwrap();

    REGISTRY.register(Box::new(ANALYSES_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(ANALYSIS_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(FUSION_CACHE_HITS.clone())).unwrap();
    REGISTRY.register(Box::new(FUSION_COALESCED.clone())).unwrap();

    REGISTRY.register(Box::new(EXCHANGE_AUTO_DETECTED.clone())).unwrap();
}

/// Get metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Timer helper for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn observe_and_reset(&mut self, histogram: &Histogram) -> f64 {
        let duration = self.elapsed_secs();
        histogram.observe(duration);
        self.start = Instant::now();
        duration
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_secs();
        assert!(elapsed >= 0.01);
    }
}
