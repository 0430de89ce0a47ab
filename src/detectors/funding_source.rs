/// Funding Source Analyzer (spec §4.5) — classifies each top holder's
/// funding origin against a labelled directory.
use super::DetectorContext;
use crate::core::errors::Result;
use crate::domain::exchange::RiskTier;
use crate::domain::schema::{DetectorOutput, Finding, Severity};
use crate::rpc::{methods, Bound};
use std::collections::HashMap;
use std::time::Duration;

const TOP_HOLDERS_CAP: usize = 10;
const EARLIEST_SIGNATURES: u64 = 20;
const OLDEST_TX_SAMPLE: usize = 3;
const WALLET_ANALYSIS_GAP_MS: u64 = 150;
const TX_FETCH_GAP_MS: u64 = 50;
const FRESH_DAYS: f64 = 7.0;

struct HolderClassification {
    address: String,
    percentage: f64,
    source_label: Option<String>,
    risk_tier: Option<RiskTier>,
    is_fresh: bool,
}

fn is_fresh_wallet(birth: Option<i64>, now: i64) -> bool {
    birth
        .map(|b| (now - b) as f64 / 86_400.0 < FRESH_DAYS)
        .unwrap_or(false)
}

/// Severity and score contribution for a same-source funding group,
/// scaled by the group's risk tier and size.
fn coordinated_funding_severity(tier: RiskTier, group_len: usize) -> (Severity, i64) {
    let severity = match (tier, group_len) {
        (RiskTier::High, n) if n >= 5 => Severity::Critical,
        (RiskTier::High, _) => Severity::High,
        (RiskTier::Medium, n) if n >= 5 => Severity::High,
        _ => Severity::Medium,
    };
    let adder = match severity {
        Severity::Critical => 35,
        Severity::High => 25,
        Severity::Medium => 15,
        _ => 10,
    };
    (severity, adder)
}

pub async fn analyze(ctx: &DetectorContext) -> Result<DetectorOutput> {
    let now = chrono::Utc::now().timestamp();
    let mut classifications = Vec::new();

    for (i, holder) in ctx.holders.iter().take(TOP_HOLDERS_CAP).enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(WALLET_ANALYSIS_GAP_MS)).await;
        }

        let mut signatures = ctx
            .signatures
            .fetch_signatures(&holder.address, Bound::UntilOldest)
            .await
            .unwrap_or_default();
        signatures.sort_by_key(|s| s.slot);
        signatures.truncate(EARLIEST_SIGNATURES as usize);

        let birth = signatures.first().and_then(|s| s.block_time);
        let is_fresh = is_fresh_wallet(birth, now);

        let mut source_label = None;
        let mut risk_tier = None;

        for (j, sig) in signatures.iter().take(OLDEST_TX_SAMPLE).enumerate() {
            if j > 0 {
                tokio::time::sleep(Duration::from_millis(TX_FETCH_GAP_MS)).await;
            }
            let tx = match methods::get_transaction(&ctx.rpc, &sig.signature).await {
                Ok(tx) => tx,
                Err(_) => continue,
            };
            for address in &tx.account_keys {
                if address == &holder.address {
                    continue;
                }
                if let Some(m) = ctx.entities.classify(address) {
                    source_label = Some(m.label);
                    risk_tier = Some(m.risk_tier);
                    break;
                }
            }
            if source_label.is_some() {
                break;
            }
        }

        classifications.push(HolderClassification {
            address: holder.address.clone(),
            percentage: holder.percentage,
            source_label,
            risk_tier,
            is_fresh,
        });
    }

    let mut score: i64 = 0;
    let mut risks = Vec::new();
    let mut findings = Vec::new();
    let mut patterns_fired: Vec<&str> = Vec::new();

    let mut by_source: HashMap<&str, Vec<&HolderClassification>> = HashMap::new();
    for c in &classifications {
        if let Some(label) = c.source_label.as_deref() {
            by_source.entry(label).or_default().push(c);
        }
    }

    for (source, group) in &by_source {
        if group.len() >= 3 {
            let tier = group[0].risk_tier.unwrap_or(RiskTier::Low);
            let (severity, adder) = coordinated_funding_severity(tier, group.len());
            score += adder;
            patterns_fired.push("coordinated_funding");
            findings.push(Finding::new(
                severity,
                "funding.coordinated_funding",
                format!("{} holders funded from the same source ({})", group.len(), source),
                group.iter().map(|c| c.address.clone()).collect(),
            ));
        }

        let fresh_in_group: Vec<&&HolderClassification> = group.iter().filter(|c| c.is_fresh).collect();
        if fresh_in_group.len() >= 3 && group[0].risk_tier == Some(RiskTier::High) {
            score += 35;
            patterns_fired.push("fresh_wallet_cluster");
            findings.push(Finding::new(
                Severity::Critical,
                "funding.fresh_wallet_cluster",
                format!("{} fresh wallets funded from high-risk source {}", fresh_in_group.len(), source),
                fresh_in_group.iter().map(|c| c.address.clone()).collect(),
            ));
        }
    }

    // Single-source dominance.
    if let Some((source, group)) = by_source
        .iter()
        .filter(|(_, g)| g[0].risk_tier == Some(RiskTier::High))
        .max_by(|(_, a), (_, b)| {
            let sa: f64 = a.iter().map(|c| c.percentage).sum();
            let sb: f64 = b.iter().map(|c| c.percentage).sum();
            sa.partial_cmp(&sb).unwrap()
        })
    {
        let supply_share: f64 = group.iter().map(|c| c.percentage).sum();
        if supply_share >= 40.0 {
            score += 35;
            patterns_fired.push("single_source_dominance");
            findings.push(Finding::new(
                Severity::Critical,
                "funding.single_source_dominance",
                format!("single high-risk source {} funds {:.1}% of supply", source, supply_share),
                group.iter().map(|c| c.address.clone()).collect(),
            ));
        } else if supply_share >= 25.0 {
            score += 20;
            patterns_fired.push("single_source_dominance");
            findings.push(Finding::new(
                Severity::High,
                "funding.single_source_dominance",
                format!("single high-risk source {} funds {:.1}% of supply", source, supply_share),
                group.iter().map(|c| c.address.clone()).collect(),
            ));
        }
    }

    let suspicious_percentage: f64 = classifications
        .iter()
        .filter(|c| matches!(c.risk_tier, Some(RiskTier::High) | Some(RiskTier::Medium)))
        .map(|c| c.percentage)
        .sum();

    let partial_score = score.clamp(0, 100) as u32;
    risks.insert(
        0,
        format!(
            "INFO: {:.1}% of holder supply traces to suspicious funding sources",
            suspicious_percentage
        ),
    );

    let breakdown: HashMap<String, f64> = by_source
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|c| c.percentage).sum()))
        .collect();

    Ok(DetectorOutput {
        partial_score,
        risks,
        findings,
        partial: false,
        evidence: serde_json::json!({
            "classifications": classifications.iter().map(|c| serde_json::json!({
                "address": c.address,
                "source": c.source_label,
                "risk_tier": c.risk_tier.map(|t| format!("{:?}", t)),
                "is_fresh": c.is_fresh,
            })).collect::<Vec<_>>(),
            "source_breakdown": breakdown,
            "patterns_fired": patterns_fired,
            "suspicious_percentage": suspicious_percentage,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_fresh_wallet_respects_fresh_days_boundary() {
        let now = 1_000_000_i64;
        let six_days_ago = now - (6.0 * 86_400.0) as i64;
        let eight_days_ago = now - (8.0 * 86_400.0) as i64;
        assert!(is_fresh_wallet(Some(six_days_ago), now));
        assert!(!is_fresh_wallet(Some(eight_days_ago), now));
        assert!(!is_fresh_wallet(None, now));
    }

    #[test]
    fn coordinated_funding_severity_escalates_with_tier_and_size() {
        assert_eq!(coordinated_funding_severity(RiskTier::High, 5), (Severity::Critical, 35));
        assert_eq!(coordinated_funding_severity(RiskTier::High, 3), (Severity::High, 25));
        assert_eq!(coordinated_funding_severity(RiskTier::Medium, 5), (Severity::High, 25));
        assert_eq!(coordinated_funding_severity(RiskTier::Medium, 3), (Severity::Medium, 15));
        assert_eq!(coordinated_funding_severity(RiskTier::Low, 3), (Severity::Medium, 15));
    }
}
