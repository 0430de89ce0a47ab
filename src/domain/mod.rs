pub mod exchange;
pub mod schema;

pub use exchange::{EntityDirectory, EntityMatch, ExchangeWhitelist, RiskTier};
pub use schema::{
    AnalysisReport, BalanceDelta, DetectorOutput, DetectorOutputs, EntityType, Finding,
    FundingHop, Holder, RiskLevel, Severity, Signature, TokenMint, Transaction,
};
