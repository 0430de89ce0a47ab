/// Whale Detector (spec §4.6) — flags early buyers whose first receive
/// exceeds 1% of supply within the launch window.
use super::DetectorContext;
use crate::core::errors::Result;
use crate::domain::schema::{DetectorOutput, Finding, Severity};
use crate::rpc::{methods, Bound};

const EARLIEST_SIGNATURE_FETCH: usize = 100;
const LAUNCH_WINDOW_SECS: i64 = 600;
const WHALE_THRESHOLD_PERCENT: f64 = 1.0;

struct WhaleBuy {
    owner: String,
    percentage: f64,
    is_exchange: bool,
}

/// Supply percentage of a single receive, or `None` if it falls below
/// `WHALE_THRESHOLD_PERCENT` or supply is unknown.
fn whale_percentage(delta_amount: f64, circulating: f64) -> Option<f64> {
    if circulating <= 0.0 {
        return None;
    }
    let percentage = delta_amount / circulating * 100.0;
    if percentage >= WHALE_THRESHOLD_PERCENT {
        Some(percentage)
    } else {
        None
    }
}

pub async fn analyze(ctx: &DetectorContext) -> Result<DetectorOutput> {
    let mut earliest = ctx
        .signatures
        .fetch_signatures(&ctx.mint.address, Bound::UntilOldest)
        .await?;
    earliest.truncate(EARLIEST_SIGNATURE_FETCH);

    let launch_time = earliest.iter().filter_map(|s| s.block_time).min();

    let Some(launch_time) = launch_time else {
        return Ok(DetectorOutput::empty());
    };

    let circulating = ctx.mint.circulating_units();
    let mut whales = Vec::new();

    for sig in &earliest {
        let Some(t) = sig.block_time else { continue };
        if t - launch_time > LAUNCH_WINDOW_SECS {
            continue;
        }
        let tx = match methods::get_transaction(&ctx.rpc, &sig.signature).await {
            Ok(tx) => tx,
            Err(_) => continue,
        };

        for delta in &tx.token_deltas {
            if delta.mint.as_deref() != Some(&ctx.mint.address) || delta.delta() <= 0.0 {
                continue;
            }
            if let Some(percentage) = whale_percentage(delta.delta(), circulating) {
                if let Some(owner) = &delta.owner {
                    whales.push(WhaleBuy {
                        owner: owner.clone(),
                        percentage,
                        is_exchange: ctx.exchanges.contains(owner),
                    });
                }
            }
        }
    }

    let (exchange_whales, non_exchange_whales): (Vec<_>, Vec<_>) =
        whales.into_iter().partition(|w| w.is_exchange);

    let total_non_exchange_percentage: f64 = non_exchange_whales.iter().map(|w| w.percentage).sum();
    let largest_buy = non_exchange_whales.iter().map(|w| w.percentage).fold(0.0, f64::max);
    let average_buy = if non_exchange_whales.is_empty() {
        0.0
    } else {
        total_non_exchange_percentage / non_exchange_whales.len() as f64
    };
    let exchange_total_percentage: f64 = exchange_whales.iter().map(|w| w.percentage).sum();

    let mut score: i64 = 0;
    let mut findings = Vec::new();
    if !non_exchange_whales.is_empty() {
        score += (total_non_exchange_percentage * 1.5) as i64;
        findings.push(Finding::new(
            if total_non_exchange_percentage > 20.0 { Severity::High } else { Severity::Medium },
            "whale.early_whale_buys",
            format!(
                "{} non-exchange wallets bought >= {}% of supply within {}s of launch, totaling {:.1}%",
                non_exchange_whales.len(),
                WHALE_THRESHOLD_PERCENT,
                LAUNCH_WINDOW_SECS,
                total_non_exchange_percentage
            ),
            non_exchange_whales.iter().map(|w| w.owner.clone()).collect(),
        ));
    }

    let partial_score = score.clamp(0, 100) as u32;
    let risks = vec![format!(
        "INFO: {} non-exchange whale buy(s), {} exchange whale buy(s) detected at launch",
        non_exchange_whales.len(),
        exchange_whales.len()
    )];

    Ok(DetectorOutput {
        partial_score,
        risks,
        findings,
        partial: false,
        evidence: serde_json::json!({
            "non_exchange_whale_count": non_exchange_whales.len(),
            "total_non_exchange_whale_percentage": total_non_exchange_percentage,
            "largest_buy_percentage": largest_buy,
            "average_buy_percentage": average_buy,
            "exchange_whale_count": exchange_whales.len(),
            "exchange_whale_percentage": exchange_total_percentage,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whale_percentage_rejects_below_threshold() {
        assert_eq!(whale_percentage(0.5, 100.0), None);
        assert_eq!(whale_percentage(0.99, 100.0), None);
    }

    #[test]
    fn whale_percentage_accepts_at_and_above_threshold() {
        assert_eq!(whale_percentage(1.0, 100.0), Some(1.0));
        assert_eq!(whale_percentage(25.0, 100.0), Some(25.0));
    }

    #[test]
    fn whale_percentage_handles_unknown_supply() {
        assert_eq!(whale_percentage(10.0, 0.0), None);
        assert_eq!(whale_percentage(10.0, -5.0), None);
    }
}
