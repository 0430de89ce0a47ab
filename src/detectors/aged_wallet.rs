/// Aged Wallet Detector (spec §4.4) — tiers holder wallets by
/// first-transaction age; detects fresh-wallet and coordinated-buy
/// patterns.
use super::{median, DetectorContext};
use crate::core::errors::Result;
use crate::domain::schema::{DetectorOutput, Finding, Severity};
use crate::rpc::{methods, Bound};
use std::collections::HashMap;

const EXTREME_DAYS: f64 = 730.0;
const HIGH_DAYS: f64 = 400.0;
const MEDIUM_DAYS: f64 = 180.0;
const LOW_DAYS: f64 = 90.0;
const FRESH_FUNDING_DAYS: f64 = 7.0;
const RECENT_TX_SAMPLE: u64 = 5;

struct WalletProfile {
    address: String,
    age_days: f64,
    tx_count: usize,
    funding_source: Option<String>,
    buy_amount: f64,
    has_sell: bool,
    first_activity: Option<i64>,
}

pub async fn analyze(ctx: &DetectorContext) -> Result<DetectorOutput> {
    let now = chrono::Utc::now().timestamp();
    let mut profiles = Vec::new();

    for holder in &ctx.holders {
        let history = ctx
            .signatures
            .fetch_signatures(&holder.address, Bound::UntilOldest)
            .await
            .unwrap_or_default();

        let oldest = history.first();
        let birth = oldest.and_then(|s| s.block_time);
        let age_days = birth.map(|b| (now - b) as f64 / 86_400.0).unwrap_or(0.0);

        let mut funding_source = None;
        let mut buy_amount = 0.0;
        if let Some(oldest_sig) = oldest {
            if let Ok(tx) = methods::get_transaction(&ctx.rpc, &oldest_sig.signature).await {
                if let Some(my_idx) = tx.account_keys.iter().position(|a| a == &holder.address) {
                    if let Some(my_delta) = tx.sol_deltas.iter().find(|d| d.account_index == my_idx) {
                        if my_delta.delta() > 0.0 {
                            funding_source = tx
                                .sol_deltas
                                .iter()
                                .filter(|d| d.account_index != my_idx && d.delta() < 0.0)
                                .max_by(|a, b| a.delta().abs().partial_cmp(&b.delta().abs()).unwrap())
                                .and_then(|d| d.owner.clone());
                        }
                    }
                }
                buy_amount = tx
                    .token_deltas
                    .iter()
                    .filter(|d| d.mint.as_deref() == Some(&ctx.mint.address) && d.delta() > 0.0)
                    .map(|d| d.delta())
                    .fold(0.0, f64::max);
            }
        }

        let mut has_sell = false;
        let recent = ctx
            .signatures
            .fetch_signatures(&holder.address, Bound::Limit(RECENT_TX_SAMPLE))
            .await
            .unwrap_or_default();
        for sig in &recent {
            if let Ok(tx) = methods::get_transaction(&ctx.rpc, &sig.signature).await {
                if tx
                    .token_deltas
                    .iter()
                    .any(|d| d.mint.as_deref() == Some(&ctx.mint.address) && d.owner.as_deref() == Some(&holder.address) && d.delta() < 0.0)
                {
                    has_sell = true;
                    break;
                }
            }
        }

        profiles.push(WalletProfile {
            address: holder.address.clone(),
            age_days,
            tx_count: history.len(),
            funding_source,
            buy_amount,
            has_sell,
            first_activity: birth,
        });
    }

    let tiers: HashMap<&str, Vec<&WalletProfile>> = {
        let mut m: HashMap<&str, Vec<&WalletProfile>> = HashMap::new();
        for p in &profiles {
            let tier = tier_of(p.age_days);
            m.entry(tier).or_default().push(p);
        }
        m
    };

    let suspicious: Vec<&WalletProfile> = profiles
        .iter()
        .filter(|p| p.age_days >= LOW_DAYS && p.tx_count > 10)
        .collect();

    let mut score: i64 = 0;
    let mut risks = Vec::new();
    let mut findings = Vec::new();
    let mut patterns_fired: Vec<&str> = Vec::new();

    let extreme_count = tiers.get("extreme").map(|v| v.len()).unwrap_or(0);
    if extreme_count >= 5 {
        score += 50;
        findings.push(Finding::new(
            Severity::High,
            "aged_wallet.extreme_tier",
            format!("{} holders are extreme-tier aged wallets (>= {} days)", extreme_count, EXTREME_DAYS),
            tiers["extreme"].iter().map(|p| p.address.clone()).collect(),
        ));
    }

    if suspicious.len() >= 10 {
        score += 40;
    } else if suspicious.len() >= 5 {
        score += 25;
    }

    if suspicious.len() >= 3 {
        // Same funding source.
        let mut by_source: HashMap<&str, Vec<&WalletProfile>> = HashMap::new();
        for p in &suspicious {
            if let Some(src) = p.funding_source.as_deref() {
                by_source.entry(src).or_default().push(p);
            }
        }
        if let Some((source, group)) = by_source.iter().max_by_key(|(_, v)| v.len()) {
            if group.len() >= 5 {
                score += 25;
                patterns_fired.push("same_funding_source");
                findings.push(Finding::new(
                    Severity::High,
                    "aged_wallet.same_funding_source",
                    format!("{} aged wallets share funding source {}", group.len(), source),
                    group.iter().map(|p| p.address.clone()).collect(),
                ));
            }
        }

        // Similar ages: birth range <= 7 days across >= 5 wallets.
        let mut births: Vec<i64> = suspicious.iter().filter_map(|p| p.first_activity).collect();
        births.sort();
        if births.len() >= 5 {
            let range_days = (*births.last().unwrap() - *births.first().unwrap()) as f64 / 86_400.0;
            if range_days <= 7.0 {
                score += 20;
                patterns_fired.push("similar_ages");
                findings.push(Finding::new(
                    Severity::Medium,
                    "aged_wallet.similar_ages",
                    format!("{} aged wallets were created within a {:.1}-day window", births.len(), range_days),
                    suspicious.iter().map(|p| p.address.clone()).collect(),
                ));
            }
        }

        // Coordinated buys: buy-timestamp range <= 60s across >= 5 wallets.
        let mut buy_times: Vec<i64> = suspicious.iter().filter_map(|p| p.first_activity).collect();
        buy_times.sort();
        if buy_times.len() >= 5 {
            let range_secs = *buy_times.last().unwrap() - *buy_times.first().unwrap();
            if range_secs <= 60 {
                score += 30;
                patterns_fired.push("coordinated_buys");
                findings.push(Finding::new(
                    Severity::Critical,
                    "aged_wallet.coordinated_buys",
                    format!("{} aged wallets bought within a {}s window", buy_times.len(), range_secs),
                    suspicious.iter().map(|p| p.address.clone()).collect(),
                ));
            }
        }

        // No sells: >= 80% of the set has only inbound transfers.
        let no_sell_count = suspicious.iter().filter(|p| !p.has_sell).count();
        if no_sell_count as f64 / suspicious.len() as f64 >= 0.8 {
            score += 15;
            patterns_fired.push("no_sells");
            risks.push("MEDIUM: aged holder set shows no outbound sells for this mint".to_string());
        }

        // Similar buy amounts: >= 80% within +/- 20% of the median.
        let amounts: Vec<f64> = suspicious.iter().map(|p| p.buy_amount).collect();
        let med = median(&amounts);
        if med > 0.0 {
            let within = amounts.iter().filter(|a| (**a - med).abs() <= med * 0.2).count();
            if within as f64 / amounts.len() as f64 >= 0.8 {
                score += 20;
                patterns_fired.push("similar_buy_amounts");
                findings.push(Finding::new(
                    Severity::Medium,
                    "aged_wallet.similar_buy_amounts",
                    format!("{} aged wallets bought within 20% of the median buy amount", within),
                    suspicious.iter().map(|p| p.address.clone()).collect(),
                ));
            }
        }
    }

    // Fresh-wallet risk: age < 7 days among top holders with > 20% share.
    let fresh_holders: Vec<&crate::domain::schema::Holder> = ctx
        .holders
        .iter()
        .filter(|h| {
            profiles
                .iter()
                .find(|p| p.address == h.address)
                .map(|p| p.age_days < FRESH_FUNDING_DAYS)
                .unwrap_or(false)
        })
        .collect();
    let fresh_share: f64 = fresh_holders.iter().map(|h| h.percentage).sum();
    if fresh_share > 20.0 {
        score += 25;
        patterns_fired.push("fresh_wallet_risk");
        findings.push(Finding::new(
            Severity::High,
            "aged_wallet.fresh_wallet_risk",
            format!("fresh wallets (< {} days) hold {:.1}% of supply among top holders", FRESH_FUNDING_DAYS, fresh_share),
            fresh_holders.iter().map(|h| h.address.clone()).collect(),
        ));
    }

    let partial_score = score.clamp(0, 100) as u32;
    risks.insert(
        0,
        format!(
            "INFO: {} of {} top holders are aged-suspicious ({})",
            suspicious.len(),
            profiles.len(),
            if patterns_fired.is_empty() { "no patterns".to_string() } else { patterns_fired.join(", ") }
        ),
    );

    Ok(DetectorOutput {
        partial_score,
        risks,
        findings,
        partial: false,
        evidence: serde_json::json!({
            "suspicious_count": suspicious.len(),
            "tier_histogram": {
                "extreme": tiers.get("extreme").map(|v| v.len()).unwrap_or(0),
                "high": tiers.get("high").map(|v| v.len()).unwrap_or(0),
                "medium": tiers.get("medium").map(|v| v.len()).unwrap_or(0),
                "low": tiers.get("low").map(|v| v.len()).unwrap_or(0),
                "none": tiers.get("none").map(|v| v.len()).unwrap_or(0),
            },
            "patterns_fired": patterns_fired,
            "fresh_wallet_share": fresh_share,
        }),
    })
}

fn tier_of(age_days: f64) -> &'static str {
    if age_days >= EXTREME_DAYS {
        "extreme"
    } else if age_days >= HIGH_DAYS {
        "high"
    } else if age_days >= MEDIUM_DAYS {
        "medium"
    } else if age_days >= LOW_DAYS {
        "low"
    } else {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_of_respects_threshold_boundaries() {
        assert_eq!(tier_of(0.0), "none");
        assert_eq!(tier_of(LOW_DAYS - 0.01), "none");
        assert_eq!(tier_of(LOW_DAYS), "low");
        assert_eq!(tier_of(MEDIUM_DAYS), "medium");
        assert_eq!(tier_of(HIGH_DAYS), "high");
        assert_eq!(tier_of(EXTREME_DAYS), "extreme");
        assert_eq!(tier_of(EXTREME_DAYS + 1000.0), "extreme");
    }
}
