/// HTTP response envelopes (spec §6 "Downstream (produced)").
use crate::domain::schema::AnalysisReport;
use crate::tracer::TraceReport;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub mint: String,
    pub safety_score: u32,
    pub risk_level: String,
    pub findings: Vec<FindingView>,
    pub detectors: serde_json::Value,
    pub evaluated_at: chrono::DateTime<chrono::Utc>,
    pub partial: bool,
}

#[derive(Debug, Serialize)]
pub struct FindingView {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub contributing_addresses: Vec<String>,
}

impl From<&AnalysisReport> for AnalyzeResponse {
    fn from(report: &AnalysisReport) -> Self {
        Self {
            mint: report.mint.clone(),
            safety_score: report.safety_score,
            risk_level: format!("{:?}", report.risk_level).to_uppercase(),
            findings: report
                .findings
                .iter()
                .map(|f| FindingView {
                    severity: format!("{:?}", f.severity).to_uppercase(),
                    code: f.code.clone(),
                    message: f.message.clone(),
                    contributing_addresses: f.contributing_addresses.clone(),
                })
                .collect(),
            detectors: serde_json::json!({
                "bundle": report.detectors.bundle,
                "aged_wallet": report.detectors.aged_wallet,
                "funding": report.detectors.funding,
                "whale": report.detectors.whale,
                "sniper_farm": report.detectors.sniper_farm,
                "time_based": report.detectors.time_based,
            }),
            evaluated_at: report.evaluated_at,
            partial: report.partial,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TraceResponse {
    pub target: String,
    pub funding_chain: Vec<serde_json::Value>,
    pub cluster: Vec<String>,
    pub potential_next_rugs: Vec<serde_json::Value>,
    pub wash_trading: serde_json::Value,
    pub investigation_summary: String,
}

impl From<&TraceReport> for TraceResponse {
    fn from(report: &TraceReport) -> Self {
        Self {
            target: report.target.clone(),
            funding_chain: report
                .funding_chain
                .iter()
                .map(|h| serde_json::to_value(h).unwrap_or_default())
                .collect(),
            cluster: report.cluster.clone(),
            potential_next_rugs: report
                .potential_next_rugs
                .iter()
                .map(|r| serde_json::to_value(r).unwrap_or_default())
                .collect(),
            wash_trading: serde_json::to_value(&report.wash_trading).unwrap_or_default(),
            investigation_summary: report.investigation_summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
