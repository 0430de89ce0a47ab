/// Shared Schema — entity shapes consumed across detectors, the tracer,
/// and the fusion aggregator (spec §3, §4.13).
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An on-chain token identifier plus the static facts about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMint {
    pub address: String,
    pub total_supply: u64,
    pub decimals: u8,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
}

impl TokenMint {
    /// Circulating supply expressed in whole token units (supply scaled
    /// down by decimals). Used as the denominator for holder percentages.
    pub fn circulating_units(&self) -> f64 {
        self.total_supply as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// A holder of a mint at a point in time. Held transiently inside a
/// single analysis — never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub address: String,
    pub balance: f64,
    pub percentage: f64,
    pub rank: u32,
}

/// `(sig_string, slot, block_time, was_error)` — the unit of history
/// traversal. `slot` is strictly increasing per endpoint-view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub was_error: bool,
}

/// A balance delta for one account index within a parsed transaction,
/// optionally carrying the SPL token mint it applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub account_index: usize,
    pub owner: Option<String>,
    pub pre_amount: f64,
    pub post_amount: f64,
    pub mint: Option<String>,
}

impl BalanceDelta {
    pub fn delta(&self) -> f64 {
        self.post_amount - self.pre_amount
    }
}

/// Parsed transaction form carrying balance deltas and account keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub account_keys: Vec<String>,
    pub sol_deltas: Vec<BalanceDelta>,
    pub token_deltas: Vec<BalanceDelta>,
    pub was_error: bool,
}

/// Classification of an entity encountered while walking funding flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Cex,
    Swap,
    Mixer,
    Bridge,
    Wallet,
    Unknown,
}

/// One hop in a backward funding-flow walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingHop {
    pub level: u32,
    pub from: String,
    pub to: String,
    pub amount_sol: f64,
    pub signature: String,
    pub timestamp: Option<i64>,
    pub entity_type: EntityType,
    pub entity_label: Option<String>,
}

/// Severity prefix used for stable-sorting evidence findings (§4.11.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// A single human-readable finding, carrying the addresses it implicates
/// so the fusion layer can enforce the no-double-counting invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub contributing_addresses: Vec<String>,
}

impl Finding {
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        contributing_addresses: Vec<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            contributing_addresses,
        }
    }
}

/// The uniform output every detector produces (spec §3 "Detector Output").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DetectorOutput {
    pub partial_score: u32,
    pub risks: Vec<String>,
    pub findings: Vec<Finding>,
    /// Set when the detector returned empty because of an RPC/data
    /// failure rather than a legitimate absence of signal (spec §7).
    pub partial: bool,
    pub evidence: serde_json::Value,
}

impl DetectorOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn empty_partial() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }

    /// All distinct addresses this detector implicated, for the
    /// no-double-counting invariant (spec §3).
    pub fn contributing_addresses(&self) -> HashSet<String> {
        self.findings
            .iter()
            .flat_map(|f| f.contributing_addresses.iter().cloned())
            .collect()
    }
}

/// Categorical risk level, derived from `safety_score` at fixed
/// thresholds (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Moderate,
    Risky,
    Dangerous,
}

impl RiskLevel {
    pub fn from_safety_score(safety_score: u32) -> Self {
        match safety_score {
            s if s >= 80 => RiskLevel::Safe,
            s if s >= 60 => RiskLevel::Moderate,
            s if s >= 40 => RiskLevel::Risky,
            _ => RiskLevel::Dangerous,
        }
    }
}

/// The terminal value of a fused analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub mint: String,
    pub safety_score: u32,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    pub detectors: DetectorOutputs,
    pub evaluated_at: chrono::DateTime<chrono::Utc>,
    /// True if any detector returned an empty result due to RPC/data
    /// failure rather than legitimate absence of signal.
    pub partial: bool,
}

/// Per-detector outputs, named fields so API consumers get a stable shape
/// instead of an array keyed by enum discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorOutputs {
    pub bundle: DetectorOutput,
    pub aged_wallet: DetectorOutput,
    pub funding: DetectorOutput,
    pub whale: DetectorOutput,
    pub sniper_farm: DetectorOutput,
    pub time_based: DetectorOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_safety_score(100), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_safety_score(80), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_safety_score(79), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_safety_score(60), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_safety_score(59), RiskLevel::Risky);
        assert_eq!(RiskLevel::from_safety_score(40), RiskLevel::Risky);
        assert_eq!(RiskLevel::from_safety_score(39), RiskLevel::Dangerous);
        assert_eq!(RiskLevel::from_safety_score(0), RiskLevel::Dangerous);
    }

    #[test]
    fn severity_ordering_is_critical_first() {
        let mut v = vec![Severity::Info, Severity::Critical, Severity::Low];
        v.sort();
        assert_eq!(v, vec![Severity::Critical, Severity::Low, Severity::Info]);
    }
}
