/// The six-detector analysis pipeline (spec §4.3-§4.8), recast as a closed
/// variant set behind a uniform `analyze(ctx) -> DetectorOutput` capability
/// per Design Notes §9 ("Polymorphic detectors") rather than the teacher's
/// class-per-module dispatch.
pub mod aged_wallet;
pub mod bundle;
pub mod funding_source;
pub mod sniper_farm;
pub mod time_based;
pub mod whale;

use crate::core::config::EngineConfig;
use crate::core::errors::Result;
use crate::domain::exchange::{EntityDirectory, ExchangeWhitelist};
use crate::domain::schema::{DetectorOutput, Holder, TokenMint};
use crate::rpc::{RpcClient, SignatureFetcher};
use std::sync::Arc;

/// Everything a detector needs to run a single analysis. Built once per
/// request by the fusion aggregator and shared (by reference) across the
/// concurrent detector fan-out.
pub struct DetectorContext {
    pub mint: TokenMint,
    /// Top-20 holders as reported by the market data oracle, unfiltered —
    /// each detector applies the exchange filter itself where the
    /// algorithm calls for it.
    pub holders: Vec<Holder>,
    pub rpc: Arc<RpcClient>,
    pub signatures: Arc<SignatureFetcher>,
    pub exchanges: Arc<ExchangeWhitelist>,
    pub entities: Arc<EntityDirectory>,
    pub config: Arc<EngineConfig>,
    /// Historical top-10 snapshot, when the caller supplied one (time-based
    /// fake-CTO analysis, spec §4.8).
    pub historical_top10: Option<Vec<Holder>>,
    /// Deploy slot, when known; inferred as the earliest observed slot
    /// otherwise (spec §4.7).
    pub deploy_slot: Option<u64>,
}

impl DetectorContext {
    /// Holders with exchange-whitelisted addresses removed, preserving
    /// rank order. Exchange addresses are never counted toward
    /// concentration or bundle evidence (spec §3 invariant).
    pub fn non_exchange_holders(&self) -> Vec<Holder> {
        self.holders
            .iter()
            .filter(|h| !self.exchanges.contains(&h.address))
            .cloned()
            .collect()
    }

    pub fn exchange_holders(&self) -> Vec<Holder> {
        self.holders
            .iter()
            .filter(|h| self.exchanges.contains(&h.address))
            .cloned()
            .collect()
    }
}

/// Closed variant set of detectors (Design Notes §9). The aggregator is a
/// simple fan-out over this enum rather than a dynamic registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    Bundle,
    AgedWallet,
    Funding,
    Whale,
    SniperFarm,
    TimeBased,
}

impl Detector {
    pub fn name(&self) -> &'static str {
        match self {
            Detector::Bundle => "bundle",
            Detector::AgedWallet => "aged_wallet",
            Detector::Funding => "funding",
            Detector::Whale => "whale",
            Detector::SniperFarm => "sniper_farm",
            Detector::TimeBased => "time_based",
        }
    }

    /// Run this detector. A failure never propagates (spec §7): it is
    /// logged and downgraded to an empty, `partial` result so one
    /// detector's trouble never poisons the fused report.
    pub async fn analyze(&self, ctx: &DetectorContext) -> DetectorOutput {
        let timer = crate::metrics::Timer::new();
        let outcome: Result<DetectorOutput> = match self {
            Detector::Bundle => bundle::analyze(ctx).await,
            Detector::AgedWallet => aged_wallet::analyze(ctx).await,
            Detector::Funding => funding_source::analyze(ctx).await,
            Detector::Whale => whale::analyze(ctx).await,
            Detector::SniperFarm => sniper_farm::analyze(ctx).await,
            Detector::TimeBased => time_based::analyze(ctx).await,
        };

        crate::metrics::DETECTOR_DURATION
            .with_label_values(&[self.name()])
            .observe(timer.elapsed_secs());

        match outcome {
            Ok(output) => {
                crate::metrics::DETECTOR_RUNS
                    .with_label_values(&[self.name(), "ok"])
                    .inc();
                crate::metrics::DETECTOR_PARTIAL_SCORE
                    .with_label_values(&[self.name()])
                    .observe(output.partial_score as f64);
                output
            }
            Err(e) => {
                tracing::warn!(detector = self.name(), error = %e, "detector failed, downgrading to empty result");
                crate::metrics::DETECTOR_RUNS
                    .with_label_values(&[self.name(), "failed"])
                    .inc();
                DetectorOutput::empty_partial()
            }
        }
    }

    pub fn all() -> [Detector; 6] {
        [
            Detector::Bundle,
            Detector::AgedWallet,
            Detector::Funding,
            Detector::Whale,
            Detector::SniperFarm,
            Detector::TimeBased,
        ]
    }
}

/// Round to the nearest multiple of `step` — used by the percentage
/// bucketing in the bundle and sniper-farm detectors.
pub(crate) fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// Population variance over a slice of values.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Median of a slice of values (copies and sorts).
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
