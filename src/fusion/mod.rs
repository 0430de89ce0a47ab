/// Fusion Aggregator (spec §4.11) — combines detector outputs into a
/// final score + categorical level + evidence list, with request
/// coalescing and a dedup/cooldown cache.
use crate::core::config::EngineConfig;
use crate::core::errors::Result;
use crate::core::validation::validate_address;
use crate::detectors::{Detector, DetectorContext};
use crate::domain::exchange::{EntityDirectory, ExchangeWhitelist};
use crate::domain::schema::{
    AnalysisReport, DetectorOutput, DetectorOutputs, Finding, RiskLevel, Severity, TokenMint,
};
use crate::oracle::MarketDataOracle;
use crate::rpc::{RpcClient, SignatureFetcher};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DETECTOR_TIMEOUT: Duration = Duration::from_secs(30);

type SharedAnalysis = Shared<BoxFuture<'static, Arc<AnalysisReport>>>;

/// `Pending -> Dispatched -> (one terminal state per detector) -> Fused ->
/// Cached`, modeled implicitly: `inflight` holds requests in
/// Pending/Dispatched, `cache` holds Fused/Cached ones. There is no
/// separate enum because the two maps already partition the state space.
pub struct FusionAggregator<O: MarketDataOracle> {
    oracle: Arc<O>,
    rpc: Arc<RpcClient>,
    signatures: Arc<SignatureFetcher>,
    exchanges: Arc<ExchangeWhitelist>,
    entities: Arc<EntityDirectory>,
    config: Arc<EngineConfig>,
    inflight: Arc<DashMap<String, SharedAnalysis>>,
    cache: Arc<DashMap<String, (Arc<AnalysisReport>, Instant)>>,
}

impl<O: MarketDataOracle + 'static> FusionAggregator<O> {
    pub fn new(
        oracle: Arc<O>,
        rpc: Arc<RpcClient>,
        signatures: Arc<SignatureFetcher>,
        exchanges: Arc<ExchangeWhitelist>,
        entities: Arc<EntityDirectory>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            oracle,
            rpc,
            signatures,
            exchanges,
            entities,
            config,
            inflight: Arc::new(DashMap::new()),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Analyze `mint`. Coalesces concurrent callers onto the same in-flight
    /// future and serves cached reports within the deduplication window
    /// unless `bypass_cache` is set.
    pub async fn analyze(&self, mint: &str, bypass_cache: bool) -> Result<Arc<AnalysisReport>> {
        validate_address(mint)?;

        let cooldown = Duration::from_millis(self.config.deduplication_window_ms);

        if !bypass_cache {
            if let Some(entry) = self.cache.get(mint) {
                let (report, cached_at) = entry.value().clone();
                if cached_at.elapsed() < cooldown {
                    crate::metrics::FUSION_CACHE_HITS.inc();
                    return Ok(report);
                }
            }

            if let Some(existing) = self.inflight.get(mint) {
                crate::metrics::FUSION_COALESCED.inc();
                return Ok(existing.value().clone().await);
            }
        }

        let fut: BoxFuture<'static, Arc<AnalysisReport>> = {
            let this_mint = mint.to_string();
            let oracle = self.oracle.clone();
            let rpc = self.rpc.clone();
            let signatures = self.signatures.clone();
            let exchanges = self.exchanges.clone();
            let entities = self.entities.clone();
            let config = self.config.clone();
            async move {
                Arc::new(run_analysis(this_mint, oracle, rpc, signatures, exchanges, entities, config).await)
            }
            .boxed()
        };
        let shared = fut.shared();
        self.inflight.insert(mint.to_string(), shared.clone());

        let report = shared.await;

        self.inflight.remove(mint);
        self.cache.insert(mint.to_string(), (report.clone(), Instant::now()));

        crate::metrics::ANALYSES_TOTAL
            .with_label_values(&[&format!("{:?}", report.risk_level)])
            .inc();

        Ok(report)
    }
}

async fn run_analysis<O: MarketDataOracle>(
    mint: String,
    oracle: Arc<O>,
    rpc: Arc<RpcClient>,
    signatures: Arc<SignatureFetcher>,
    exchanges: Arc<ExchangeWhitelist>,
    entities: Arc<EntityDirectory>,
    config: Arc<EngineConfig>,
) -> AnalysisReport {
    let timer = crate::metrics::Timer::new();
    let deadline = Duration::from_millis(config.analysis_timeout_ms);

    let holders = match tokio::time::timeout(deadline, oracle.top_holders(&mint)).await {
        Ok(Ok(holders)) => holders,
        Ok(Err(_)) | Err(_) => {
            // All RPC endpoints exhausted / oracle unreachable before we
            // could even obtain a holder list (spec §8 boundary 11).
            return degraded_report(mint, timer.elapsed_secs());
        }
    };

    if holders.is_empty() {
        // Zero holders: all detectors return empty; safety_score = 100;
        // risk_level = SAFE (spec §8 boundary 9).
        crate::metrics::ANALYSIS_DURATION.observe(timer.elapsed_secs());
        return AnalysisReport {
            mint,
            safety_score: 100,
            risk_level: RiskLevel::Safe,
            findings: vec![],
            detectors: DetectorOutputs {
                bundle: DetectorOutput::empty(),
                aged_wallet: DetectorOutput::empty(),
                funding: DetectorOutput::empty(),
                whale: DetectorOutput::empty(),
                sniper_farm: DetectorOutput::empty(),
                time_based: DetectorOutput::empty(),
            },
            evaluated_at: chrono::Utc::now(),
            partial: false,
        };
    }

    let total_supply = holders.iter().map(|h| h.balance).sum::<f64>() as u64;
    let token_mint = TokenMint {
        address: mint.clone(),
        total_supply,
        decimals: 0,
        mint_authority: None,
        freeze_authority: None,
    };

    let ctx = Arc::new(DetectorContext {
        mint: token_mint,
        holders,
        rpc,
        signatures,
        exchanges,
        entities,
        config,
        historical_top10: None,
        deploy_slot: None,
    });

    let outputs = dispatch_all(ctx).await;

    let partial = outputs.bundle.partial
        || outputs.aged_wallet.partial
        || outputs.funding.partial
        || outputs.whale.partial
        || outputs.sniper_farm.partial
        || outputs.time_based.partial;

    let sum: u32 = outputs.bundle.partial_score
        + outputs.aged_wallet.partial_score
        + outputs.funding.partial_score
        + outputs.whale.partial_score
        + outputs.sniper_farm.partial_score
        + outputs.time_based.partial_score;
    let clamped_sum = sum.min(100);
    let safety_score = 100 - clamped_sum;
    let risk_level = RiskLevel::from_safety_score(safety_score);

    let mut findings = Vec::new();
    findings.extend(outputs.bundle.findings.clone());
    findings.extend(outputs.aged_wallet.findings.clone());
    findings.extend(outputs.funding.findings.clone());
    findings.extend(outputs.whale.findings.clone());
    findings.extend(outputs.sniper_farm.findings.clone());
    findings.extend(outputs.time_based.findings.clone());

    let findings = dedup_and_sort_findings(findings);

    crate::metrics::ANALYSIS_DURATION.observe(timer.elapsed_secs());

    AnalysisReport {
        mint,
        safety_score,
        risk_level,
        findings,
        detectors: outputs,
        evaluated_at: chrono::Utc::now(),
        partial,
    }
}

async fn dispatch_all(ctx: Arc<DetectorContext>) -> DetectorOutputs {
    let run = |d: Detector, ctx: Arc<DetectorContext>| async move {
        match tokio::time::timeout(DETECTOR_TIMEOUT, d.analyze(&ctx)).await {
            Ok(output) => output,
            Err(_) => {
                tracing::warn!(detector = d.name(), "detector exceeded its individual timeout");
                DetectorOutput::empty_partial()
            }
        }
    };

    let (bundle, aged_wallet, funding, whale, sniper_farm, time_based) = tokio::join!(
        run(Detector::Bundle, ctx.clone()),
        run(Detector::AgedWallet, ctx.clone()),
        run(Detector::Funding, ctx.clone()),
        run(Detector::Whale, ctx.clone()),
        run(Detector::SniperFarm, ctx.clone()),
        run(Detector::TimeBased, ctx.clone()),
    );

    DetectorOutputs {
        bundle,
        aged_wallet,
        funding,
        whale,
        sniper_farm,
        time_based,
    }
}

fn degraded_report(mint: String, elapsed_secs: f64) -> AnalysisReport {
    crate::metrics::ANALYSIS_DURATION.observe(elapsed_secs);
    AnalysisReport {
        mint,
        safety_score: 100,
        risk_level: RiskLevel::Safe,
        findings: vec![Finding::new(
            Severity::Info,
            "fusion.data_unavailable",
            "data unavailable: all RPC endpoints failed or the request deadline expired",
            vec![],
        )],
        detectors: DetectorOutputs {
            bundle: DetectorOutput::empty_partial(),
            aged_wallet: DetectorOutput::empty_partial(),
            funding: DetectorOutput::empty_partial(),
            whale: DetectorOutput::empty_partial(),
            sniper_farm: DetectorOutput::empty_partial(),
            time_based: DetectorOutput::empty_partial(),
        },
        evaluated_at: chrono::Utc::now(),
        partial: true,
    }
}

/// De-duplicate findings by exact message match, then stable-sort by
/// severity (CRITICAL, HIGH, MEDIUM, LOW, INFO) — spec §4.11.5.
fn dedup_and_sort_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<Finding> = findings
        .into_iter()
        .filter(|f| seen.insert(f.message.clone()))
        .collect();
    deduped.sort_by_key(|f| f.severity);
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::EngineError;
    use crate::domain::schema::Holder;
    use crate::oracle::InMemoryOracle;

    fn test_aggregator() -> FusionAggregator<InMemoryOracle> {
        let config = Arc::new(EngineConfig::for_test());
        let balancer = Arc::new(crate::rpc::balancer::RpcBalancer::new(&config));
        let rpc = Arc::new(RpcClient::new(balancer));
        let signatures = Arc::new(SignatureFetcher::new(rpc.clone()));
        let exchanges = Arc::new(ExchangeWhitelist::new(Default::default()));
        let entities = Arc::new(EntityDirectory::new(Default::default(), Default::default(), Default::default(), Default::default()));
        FusionAggregator::new(Arc::new(InMemoryOracle::new()), rpc, signatures, exchanges, entities, config)
    }

    #[tokio::test]
    async fn zero_holders_yields_safe_report() {
        let aggregator = test_aggregator();
        let report = aggregator.analyze("Mint1111111111111111111111111111111111111", false).await.unwrap();
        assert_eq!(report.safety_score, 100);
        assert_eq!(report.risk_level, RiskLevel::Safe);
    }

    #[tokio::test]
    async fn rejects_malformed_mint() {
        let aggregator = test_aggregator();
        let result = aggregator.analyze("short", false).await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_sorts_by_severity() {
        let findings = vec![
            Finding::new(Severity::Low, "a", "dup", vec![]),
            Finding::new(Severity::Critical, "b", "unique", vec![]),
            Finding::new(Severity::Low, "c", "dup", vec![]),
        ];
        let out = dedup_and_sort_findings(findings);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].severity, Severity::Critical);
    }

    #[test]
    fn holder_with_full_supply_has_single_address() {
        let h = Holder { address: "Solo".to_string(), balance: 1000.0, percentage: 100.0, rank: 1 };
        assert_eq!(h.percentage, 100.0);
    }
}
