/// Time-Based Analyzer (spec §4.8) — sells-over-time analysis per holder;
/// classifies dump pattern; computes Gini.
use super::DetectorContext;
use crate::core::errors::Result;
use crate::domain::schema::{DetectorOutput, Finding, Severity};
use crate::rpc::{methods, Bound};
use std::collections::HashSet;

const LOOKBACK_HOURS: f64 = 168.0;
const SIGNATURE_SAMPLE: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BleedPattern {
    GradualDump,
    StairStep,
    SuddenDrop,
    None,
}

struct BleedResult {
    address: String,
    pattern: BleedPattern,
    sell_percent: f64,
}

pub async fn analyze(ctx: &DetectorContext) -> Result<DetectorOutput> {
    let now = chrono::Utc::now().timestamp();
    let lookback_cutoff = now - (LOOKBACK_HOURS * 3_600.0) as i64;

    let mut bleeds = Vec::new();

    for holder in &ctx.holders {
        let signatures = ctx
            .signatures
            .fetch_signatures(&holder.address, Bound::Limit(SIGNATURE_SAMPLE))
            .await
            .unwrap_or_default();

        let in_window: Vec<_> = signatures
            .iter()
            .filter(|s| s.block_time.map(|t| t >= lookback_cutoff).unwrap_or(false))
            .collect();

        let mut sells = Vec::new();
        for sig in &in_window {
            let tx = match methods::get_transaction(&ctx.rpc, &sig.signature).await {
                Ok(tx) => tx,
                Err(_) => continue,
            };
            for delta in &tx.token_deltas {
                if delta.mint.as_deref() == Some(&ctx.mint.address)
                    && delta.owner.as_deref() == Some(&holder.address)
                    && delta.delta() < 0.0
                {
                    sells.push((sig.block_time.unwrap_or(now), delta.pre_amount, -delta.delta()));
                }
            }
        }

        if sells.is_empty() {
            continue;
        }

        sells.sort_by_key(|s| s.0);
        let initial_balance = sells[0].1.max(holder.balance);
        let total_sold: f64 = sells.iter().map(|s| s.2).sum();
        let sell_percent = if initial_balance > 0.0 { total_sold / initial_balance * 100.0 } else { 0.0 };
        let sell_count = sells.len();
        let duration_hours = (sells.last().unwrap().0 - sells.first().unwrap().0) as f64 / 3_600.0;

        let pattern = if sell_percent >= 20.0 && sell_count >= 5 && duration_hours > 24.0 {
            BleedPattern::GradualDump
        } else if sell_percent >= 20.0 && (3..5).contains(&sell_count) {
            BleedPattern::StairStep
        } else if sell_percent >= 20.0 && sell_count <= 2 {
            BleedPattern::SuddenDrop
        } else {
            BleedPattern::None
        };

        if pattern != BleedPattern::None {
            bleeds.push(BleedResult {
                address: holder.address.clone(),
                pattern,
                sell_percent,
            });
        }
    }

    let mut findings = Vec::new();
    let mut score: i64 = 0;

    for bleed in &bleeds {
        let label = match bleed.pattern {
            BleedPattern::GradualDump => "gradual_dump",
            BleedPattern::StairStep => "stair_step",
            BleedPattern::SuddenDrop => "sudden_drop",
            BleedPattern::None => unreachable!(),
        };
        findings.push(Finding::new(
            if bleed.pattern == BleedPattern::SuddenDrop { Severity::High } else { Severity::Medium },
            "time_based.slow_bleed",
            format!("{} sold {:.1}% of its position ({})", bleed.address, bleed.sell_percent, label),
            vec![bleed.address.clone()],
        ));
    }

    // Velocity score: per bleed 40/25/15 + min(20, sellPercent*0.5), capped 100.
    let velocity: f64 = bleeds
        .iter()
        .map(|b| {
            let base = match b.pattern {
                BleedPattern::SuddenDrop => 40.0,
                BleedPattern::StairStep => 25.0,
                BleedPattern::GradualDump => 15.0,
                BleedPattern::None => 0.0,
            };
            base + (b.sell_percent * 0.5).min(20.0)
        })
        .sum::<f64>()
        .min(100.0);
    score += velocity as i64;

    // Fake-CTO synthesis, only when a historical snapshot was supplied.
    let mut fake_cto_confidence = 0.0;
    if let Some(historical) = &ctx.historical_top10 {
        let current_top10: Vec<_> = ctx.holders.iter().take(10).collect();
        let current_set: HashSet<&str> = current_top10.iter().map(|h| h.address.as_str()).collect();
        let historical_set: HashSet<&str> = historical.iter().map(|h| h.address.as_str()).collect();

        let new_whales: Vec<&str> = current_set.difference(&historical_set).copied().collect();
        let exited_whales: Vec<&str> = historical_set.difference(&current_set).copied().collect();

        let new_whale_percent: f64 = current_top10
            .iter()
            .filter(|h| new_whales.contains(&h.address.as_str()))
            .map(|h| h.percentage)
            .sum();

        let current_top10_total: f64 = current_top10.iter().map(|h| h.percentage).sum();
        let historical_top10_total: f64 = historical.iter().take(10).map(|h| h.percentage).sum();
        let top10_change = current_top10_total - historical_top10_total;

        fake_cto_confidence = 30.0 * (new_whales.len() >= 5) as i32 as f64
            + 35.0 * (new_whale_percent > 30.0) as i32 as f64
            + 20.0 * (exited_whales.len() >= 3) as i32 as f64
            + 15.0 * (top10_change.abs() > 15.0) as i32 as f64;

        if fake_cto_confidence >= 50.0 {
            score += 30;
            findings.push(Finding::new(
                Severity::High,
                "time_based.fake_cto",
                format!(
                    "holder set rotated: {} new whales ({:.1}%), {} exited, confidence {:.0}",
                    new_whales.len(),
                    new_whale_percent,
                    exited_whales.len(),
                    fake_cto_confidence
                ),
                new_whales.iter().map(|s| s.to_string()).collect(),
            ));
        }
    }

    // Gini coefficient over all holder balances.
    let gini = gini_coefficient(&ctx.holders.iter().map(|h| h.balance).collect::<Vec<_>>());
    let is_slow_rug = bleeds.len() >= 2 && velocity > 30.0;
    if gini > 0.7 {
        score += 20;
        findings.push(Finding::new(
            Severity::Medium,
            "time_based.high_gini",
            format!("holder distribution Gini coefficient is {:.3}", gini),
            vec![],
        ));
    }

    let partial_score = score.clamp(0, 100) as u32;
    let risks = vec![format!(
        "INFO: {} slow-bleed holder(s), velocity {:.0}, Gini {:.3}, slow_rug={}",
        bleeds.len(),
        velocity,
        gini,
        is_slow_rug
    )];

    Ok(DetectorOutput {
        partial_score,
        risks,
        findings,
        partial: false,
        evidence: serde_json::json!({
            "bleed_count": bleeds.len(),
            "velocity": velocity,
            "gini": gini,
            "is_slow_rug": is_slow_rug,
            "fake_cto_confidence": fake_cto_confidence,
        }),
    })
}

/// Standard Gini coefficient over a positive distribution: 0 = uniform,
/// 1 = a single holder owning everything.
fn gini_coefficient(balances: &[f64]) -> f64 {
    let n = balances.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        // A single holder owning the entire observed distribution is the
        // maximal-inequality edge case (spec §8 boundary property 6).
        return 1.0;
    }
    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let sum: f64 = sorted.iter().sum();
    if sum == 0.0 {
        return 0.0;
    }

    let weighted_sum: f64 = sorted.iter().enumerate().map(|(i, v)| (i as f64 + 1.0) * v).sum();
    (2.0 * weighted_sum) / (n as f64 * sum) - (n as f64 + 1.0) / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gini_uniform_distribution_is_zero() {
        let g = gini_coefficient(&[10.0, 10.0, 10.0, 10.0]);
        assert!(g.abs() < 1e-9);
    }

    #[test]
    fn gini_single_holder_is_one() {
        assert_eq!(gini_coefficient(&[100.0]), 1.0);
    }
}
