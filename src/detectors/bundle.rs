/// Bundle Detector (spec §4.3) — clusters early buys by time and by
/// balance-similarity across top holders.
use super::{round_to, variance, DetectorContext};
use crate::core::errors::Result;
use crate::domain::schema::{DetectorOutput, Finding, Severity};
use crate::rpc::{methods, Bound};
use std::collections::HashMap;

const EARLIEST_SIGNATURE_FETCH: usize = 100;
const TIMING_WINDOW_MS: i64 = 400;

pub async fn analyze(ctx: &DetectorContext) -> Result<DetectorOutput> {
    let non_exchange = ctx.non_exchange_holders();
    let mut score: i64 = 0;
    let mut risks = Vec::new();
    let mut findings = Vec::new();
    let mut patterns_fired: Vec<&str> = Vec::new();

    let mut earliest = ctx
        .signatures
        .fetch_signatures(&ctx.mint.address, Bound::UntilOldest)
        .await?;
    earliest.truncate(EARLIEST_SIGNATURE_FETCH);

    // 1. Timing clustering over the first 20 signatures, oldest-first.
    let first_20: Vec<_> = earliest.iter().take(20).collect();
    let largest_cluster_sigs = largest_timing_cluster(&first_20);

    // Resolve the buyer (receiving, non-program account with the largest
    // positive token delta for this mint) for each clustered signature, to
    // test the "non-exchange wallets" condition in step 5.
    let mut cluster_buyers = Vec::new();
    for sig in &largest_cluster_sigs {
        if let Ok(tx) = methods::get_transaction(&ctx.rpc, &sig.signature).await {
            if let Some(buyer) = largest_mint_receiver(&tx, &ctx.mint.address) {
                cluster_buyers.push(buyer);
            }
        }
    }
    let non_exchange_cluster_buyers: Vec<_> = cluster_buyers
        .iter()
        .filter(|a| !ctx.exchanges.contains(*a))
        .collect();

    if largest_cluster_sigs.len() >= 3 && non_exchange_cluster_buyers.len() >= 3 {
        score += 40;
        patterns_fired.push("timing_cluster");
        findings.push(Finding::new(
            Severity::High,
            "bundle.timing_cluster",
            format!(
                "{} early buys landed within a {}ms window of each other",
                largest_cluster_sigs.len(),
                TIMING_WINDOW_MS
            ),
            non_exchange_cluster_buyers.iter().map(|s| s.to_string()).collect(),
        ));
    }

    if !cluster_buyers.is_empty() {
        let exchange_count = cluster_buyers.len() - non_exchange_cluster_buyers.len();
        if exchange_count as f64 / cluster_buyers.len() as f64 > 0.5 {
            score -= 15;
            patterns_fired.push("benign_liquidity");
            risks.push("INFO: early-buyer set is majority exchange addresses (benign liquidity signal)".to_string());
        }
    }

    // 3. Concentration patterns on the exchange-filtered top-20.
    let percentages: Vec<f64> = non_exchange.iter().map(|h| h.percentage).collect();

    // (a) identical percentage (rounded to 0.1%) in 0.5-5% band, >= 8 holders.
    let mut rounded_buckets: HashMap<i64, Vec<&str>> = HashMap::new();
    for h in &non_exchange {
        if (0.5..=5.0).contains(&h.percentage) {
            let key = (round_to(h.percentage, 0.1) * 1000.0).round() as i64;
            rounded_buckets.entry(key).or_default().push(&h.address);
        }
    }
    if let Some((_, addrs)) = rounded_buckets.iter().max_by_key(|(_, v)| v.len()) {
        if addrs.len() >= 8 {
            score += 35;
            patterns_fired.push("identical_percentage");
            findings.push(Finding::new(
                Severity::High,
                "bundle.identical_percentage",
                format!("{} holders share an identical percentage in the 0.5-5% band", addrs.len()),
                addrs.iter().map(|s| s.to_string()).collect(),
            ));
        }
    }

    // (b) >= 10 holders in the 1-3% band with inter-holder variance < 0.04.
    let band: Vec<f64> = percentages.iter().copied().filter(|p| (1.0..=3.0).contains(p)).collect();
    if band.len() >= 10 && variance(&band) < 0.04 {
        score += 25;
        patterns_fired.push("low_variance_band");
        let addrs: Vec<String> = non_exchange
            .iter()
            .filter(|h| (1.0..=3.0).contains(&h.percentage))
            .map(|h| h.address.clone())
            .collect();
        findings.push(Finding::new(
            Severity::High,
            "bundle.low_variance_band",
            format!("{} holders cluster tightly in the 1-3% band (variance {:.4})", band.len(), variance(&band)),
            addrs,
        ));
    }

    // (c) top-5 / top-10 concentration sums.
    let top5_sum: f64 = non_exchange.iter().take(5).map(|h| h.percentage).sum();
    let top10_sum: f64 = non_exchange.iter().take(10).map(|h| h.percentage).sum();
    if top5_sum > 60.0 {
        score += 20;
        patterns_fired.push("top5_concentration");
        findings.push(Finding::new(
            Severity::Medium,
            "bundle.top5_concentration",
            format!("top-5 non-exchange holders control {:.1}% of supply", top5_sum),
            non_exchange.iter().take(5).map(|h| h.address.clone()).collect(),
        ));
    }
    if top10_sum > 80.0 {
        score += 15;
        patterns_fired.push("top10_concentration");
        findings.push(Finding::new(
            Severity::Medium,
            "bundle.top10_concentration",
            format!("top-10 non-exchange holders control {:.1}% of supply", top10_sum),
            non_exchange.iter().take(10).map(|h| h.address.clone()).collect(),
        ));
    }

    // 4. Network pattern: group by percentage rounded to 0.05%.
    let mut network_buckets: HashMap<i64, Vec<&str>> = HashMap::new();
    for h in &non_exchange {
        let key = (round_to(h.percentage, 0.05) * 1000.0).round() as i64;
        network_buckets.entry(key).or_default().push(&h.address);
    }
    if let Some((_, addrs)) = network_buckets.iter().max_by_key(|(_, v)| v.len()) {
        if addrs.len() >= 5 {
            score += 15;
            patterns_fired.push("network_pattern");
            findings.push(Finding::new(
                Severity::Medium,
                "bundle.network_pattern",
                format!("{} holders share a near-identical percentage bucket", addrs.len()),
                addrs.iter().map(|s| s.to_string()).collect(),
            ));
        }
    }

    let partial_score = score.clamp(0, 100) as u32;
    let is_bundled = partial_score >= 50;
    risks.insert(
        0,
        format!(
            "{}: bundle patterns fired: {}",
            if is_bundled { "HIGH" } else { "INFO" },
            if patterns_fired.is_empty() { "none".to_string() } else { patterns_fired.join(", ") }
        ),
    );

    Ok(DetectorOutput {
        partial_score,
        risks,
        findings,
        partial: false,
        evidence: serde_json::json!({
            "is_bundled": is_bundled,
            "is_legit_liquidity": patterns_fired.contains(&"benign_liquidity"),
            "patterns_fired": patterns_fired,
            "top5_sum": top5_sum,
            "top10_sum": top10_sum,
        }),
    })
}

/// Walk signatures in slot order (already oldest-first); open a new
/// cluster whenever consecutive block times differ by more than
/// `TIMING_WINDOW_MS`; close clusters of size >= 3; return the largest.
fn largest_timing_cluster<'a>(
    sigs: &[&'a crate::domain::schema::Signature],
) -> Vec<&'a crate::domain::schema::Signature> {
    let mut clusters: Vec<Vec<&crate::domain::schema::Signature>> = Vec::new();
    let mut current: Vec<&crate::domain::schema::Signature> = Vec::new();

    for sig in sigs {
        match (current.last(), sig.block_time) {
            (Some(prev), Some(t)) if prev.block_time.is_some() => {
                let prev_t = prev.block_time.unwrap();
                if (t - prev_t).abs() * 1000 <= TIMING_WINDOW_MS {
                    current.push(sig);
                } else {
                    if current.len() >= 3 {
                        clusters.push(current.clone());
                    }
                    current = vec![sig];
                }
            }
            _ => current.push(sig),
        }
    }
    if current.len() >= 3 {
        clusters.push(current);
    }

    clusters
        .into_iter()
        .max_by_key(|c| c.len())
        .unwrap_or_default()
}

/// The receiving account with the largest positive token-balance delta for
/// `mint` in a parsed transaction — the "buyer" in an early-signature.
fn largest_mint_receiver(tx: &crate::domain::schema::Transaction, mint: &str) -> Option<String> {
    tx.token_deltas
        .iter()
        .filter(|d| d.mint.as_deref() == Some(mint) && d.delta() > 0.0)
        .max_by(|a, b| a.delta().partial_cmp(&b.delta()).unwrap())
        .and_then(|d| d.owner.clone())
}
