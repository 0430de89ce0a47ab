/// Sniper Farm Detector (spec §4.7) — clusters snipers by slot and by
/// Jito tip usage; identifies the "first-in" wallet.
use super::DetectorContext;
use crate::core::errors::Result;
use crate::domain::schema::{DetectorOutput, Finding, Severity};
use crate::rpc::{methods, Bound};
use std::collections::HashMap;

const EARLIEST_SIGNATURE_FETCH: usize = 100;
/// Fixed per the spec's Open Questions resolution (10 slots, not the
/// unstated transaction-index cutoff the source alternately used).
const SNIPER_WINDOW_SLOTS: u64 = 10;
const FRESH_HOURS: f64 = 24.0;

struct Sniper {
    address: String,
    slot: u64,
    is_fresh: bool,
    jito_tip_amount: f64,
}

/// "jito_bundle" when a majority of the same-slot group paid a Jito tip,
/// otherwise "coordinated_buy".
fn cluster_pattern(jito_users: usize, group_len: usize) -> &'static str {
    if jito_users * 2 > group_len {
        "jito_bundle"
    } else {
        "coordinated_buy"
    }
}

fn compute_score(
    fresh_percent: f64,
    jito_percent: f64,
    sniper_holder_supply: f64,
    cluster_count: u32,
    first_in_fresh: bool,
) -> f64 {
    (fresh_percent * 0.5).min(30.0)
        + (jito_percent * 0.3).min(20.0)
        + sniper_holder_supply.min(30.0)
        + 5.0 * cluster_count as f64
        + if first_in_fresh { 15.0 } else { 0.0 }
}

pub async fn analyze(ctx: &DetectorContext) -> Result<DetectorOutput> {
    let mut earliest = ctx
        .signatures
        .fetch_signatures(&ctx.mint.address, Bound::UntilOldest)
        .await?;
    earliest.truncate(EARLIEST_SIGNATURE_FETCH);
    earliest.sort_by_key(|s| s.slot);

    let deploy_slot = ctx
        .deploy_slot
        .or_else(|| earliest.first().map(|s| s.slot))
        .unwrap_or(0);
    let window_end = deploy_slot + SNIPER_WINDOW_SLOTS;

    let now = chrono::Utc::now().timestamp();
    let mut snipers = Vec::new();

    for sig in earliest.iter().filter(|s| s.slot >= deploy_slot && s.slot <= window_end) {
        let tx = match methods::get_transaction(&ctx.rpc, &sig.signature).await {
            Ok(tx) => tx,
            Err(_) => continue,
        };

        let receiver = tx
            .token_deltas
            .iter()
            .filter(|d| d.mint.as_deref() == Some(&ctx.mint.address) && d.delta() > 0.0)
            .max_by(|a, b| a.delta().partial_cmp(&b.delta()).unwrap())
            .and_then(|d| d.owner.clone());

        let Some(address) = receiver else { continue };

        let history = ctx
            .signatures
            .fetch_signatures(&address, Bound::UntilOldest)
            .await
            .unwrap_or_default();
        let birth = history.first().and_then(|s| s.block_time);
        let is_fresh = birth.map(|b| (now - b) as f64 / 3_600.0 < FRESH_HOURS).unwrap_or(false);

        let jito_tip_amount: f64 = tx
            .sol_deltas
            .iter()
            .filter(|d| {
                d.owner
                    .as_deref()
                    .map(|o| ctx.config.jito_tip_accounts.contains(o))
                    .unwrap_or(false)
                    && d.delta() > 0.0
            })
            .map(|d| d.delta())
            .sum();

        snipers.push(Sniper {
            address,
            slot: sig.slot,
            is_fresh,
            jito_tip_amount,
        });
    }

    // Same-slot clusters of >= 3 wallets.
    let mut by_slot: HashMap<u64, Vec<&Sniper>> = HashMap::new();
    for s in &snipers {
        by_slot.entry(s.slot).or_default().push(s);
    }

    let mut findings = Vec::new();
    let mut cluster_count = 0u32;
    for (slot, group) in &by_slot {
        if group.len() >= 3 {
            cluster_count += 1;
            let jito_users = group.iter().filter(|s| s.jito_tip_amount > 0.0).count();
            let pattern = cluster_pattern(jito_users, group.len());
            findings.push(Finding::new(
                Severity::High,
                "sniper_farm.same_slot_cluster",
                format!("{} wallets sniped at slot {} ({})", group.len(), slot, pattern),
                group.iter().map(|s| s.address.clone()).collect(),
            ));
        }
    }

    let fresh_snipers: Vec<&Sniper> = snipers.iter().filter(|s| s.is_fresh).collect();
    if fresh_snipers.len() >= 3 {
        findings.push(Finding::new(
            Severity::High,
            "sniper_farm.fresh_farm_cluster",
            format!("{} fresh wallets (< {}h old) sniped the launch window", fresh_snipers.len(), FRESH_HOURS),
            fresh_snipers.iter().map(|s| s.address.clone()).collect(),
        ));
    }

    let first_in = snipers.iter().min_by_key(|s| s.slot);
    let first_in_fresh = first_in.map(|s| s.is_fresh).unwrap_or(false);

    let fresh_percent = if snipers.is_empty() {
        0.0
    } else {
        fresh_snipers.len() as f64 / snipers.len() as f64 * 100.0
    };
    let jito_users_total = snipers.iter().filter(|s| s.jito_tip_amount > 0.0).count();
    let jito_percent = if snipers.is_empty() {
        0.0
    } else {
        jito_users_total as f64 / snipers.len() as f64 * 100.0
    };

    let sniper_holder_supply: f64 = ctx
        .holders
        .iter()
        .filter(|h| snipers.iter().any(|s| s.address == h.address))
        .map(|h| h.percentage)
        .sum();

    let score = compute_score(fresh_percent, jito_percent, sniper_holder_supply, cluster_count, first_in_fresh);

    let partial_score = (score.round() as i64).clamp(0, 100) as u32;
    let risks = vec![format!(
        "INFO: {} snipers identified in the {}-slot launch window, {} clusters, first-in {}",
        snipers.len(),
        SNIPER_WINDOW_SLOTS,
        cluster_count,
        if first_in_fresh { "fresh" } else { "established" }
    )];

    Ok(DetectorOutput {
        partial_score,
        risks,
        findings,
        partial: false,
        evidence: serde_json::json!({
            "sniper_count": snipers.len(),
            "fresh_percent": fresh_percent,
            "jito_percent": jito_percent,
            "cluster_count": cluster_count,
            "first_in_wallet": first_in.map(|s| s.address.clone()),
            "first_in_fresh": first_in_fresh,
            "sniper_holder_supply_percent": sniper_holder_supply,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_pattern_flags_jito_bundle_on_majority() {
        assert_eq!(cluster_pattern(2, 3), "jito_bundle");
        assert_eq!(cluster_pattern(3, 3), "jito_bundle");
    }

    #[test]
    fn cluster_pattern_flags_coordinated_buy_on_minority() {
        assert_eq!(cluster_pattern(0, 3), "coordinated_buy");
        assert_eq!(cluster_pattern(1, 3), "coordinated_buy");
    }

    #[test]
    fn compute_score_caps_each_component() {
        // fresh/jito/supply terms are each capped independently.
        let capped = compute_score(100.0, 100.0, 100.0, 0, false);
        assert_eq!(capped, 30.0 + 20.0 + 30.0);
    }

    #[test]
    fn compute_score_adds_cluster_and_first_in_bonuses() {
        let score = compute_score(0.0, 0.0, 0.0, 2, true);
        assert_eq!(score, 5.0 * 2.0 + 15.0);
    }
}
