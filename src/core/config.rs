use crate::core::errors::{EngineError, Result};
use std::collections::{HashMap, HashSet};
use std::env;

/// Weighted RPC endpoint as configured (before health scoring kicks in).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RpcEndpointConfig {
    pub url: String,
    pub weight: u32,
    pub label: String,
}

/// A single immutable configuration value constructed at startup.
///
/// Every component reads its knobs from here rather than calling
/// `env::var` ad-hoc — centralising configuration this way is one of the
/// re-shapes the architecture calls for.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rpc_endpoints: Vec<RpcEndpointConfig>,
    pub known_exchange_addresses: HashSet<String>,
    pub jito_tip_accounts: HashSet<String>,
    pub cex_deposit_addresses: HashMap<String, HashSet<String>>,
    pub swap_service_addresses: HashMap<String, HashSet<String>>,
    pub mixer_addresses: HashMap<String, HashSet<String>>,
    pub bridge_addresses: HashMap<String, HashSet<String>>,
    pub official_token_mint_address: Option<String>,
    pub analysis_timeout_ms: u64,
    pub deduplication_window_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter: f64,
    pub api_keys: Vec<String>,
    pub rate_limit_per_minute: u32,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// conservative defaults suitable for local development.
    ///
    /// Complex fields (`rpc_endpoints`, address directories) are read as
    /// JSON; a production deployment is expected to set these explicitly.
    pub fn from_env() -> Result<Self> {
        let rpc_endpoints = match env::var("RPC_ENDPOINTS") {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                EngineError::InvalidInput(format!("RPC_ENDPOINTS is not valid JSON: {e}"))
            })?,
            Err(_) => vec![RpcEndpointConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                weight: 10,
                label: "default".to_string(),
            }],
        };

        if rpc_endpoints.is_empty() {
            return Err(EngineError::InvalidInput(
                "rpc_endpoints must be non-empty".to_string(),
            ));
        }

        let known_exchange_addresses = read_set_env("KNOWN_EXCHANGE_ADDRESSES");
        let jito_tip_accounts = read_set_env_or("JITO_TIP_ACCOUNTS", default_jito_accounts());

        let cex_deposit_addresses = read_directory_env("CEX_DEPOSIT_ADDRESSES");
        let swap_service_addresses = read_directory_env("SWAP_SERVICE_ADDRESSES");
        let mixer_addresses = read_directory_env("MIXER_ADDRESSES");
        let bridge_addresses = read_directory_env("BRIDGE_ADDRESSES");

        let api_keys = env::var("API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(EngineConfig {
            rpc_endpoints,
            known_exchange_addresses,
            jito_tip_accounts,
            cex_deposit_addresses,
            swap_service_addresses,
            mixer_addresses,
            bridge_addresses,
            official_token_mint_address: env::var("OFFICIAL_TOKEN_MINT_ADDRESS").ok(),
            analysis_timeout_ms: env_u64("ANALYSIS_TIMEOUT_MS", 30_000),
            deduplication_window_ms: env_u64("DEDUPLICATION_WINDOW_MS", 30_000),
            backoff_base_ms: env_u64("BACKOFF_BASE_MS", 500),
            backoff_max_ms: env_u64("BACKOFF_MAX_MS", 30_000),
            jitter: env::var("JITTER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.20),
            api_keys,
            rate_limit_per_minute: env_u64("RATE_LIMIT_PER_MINUTE", 60) as u32,
        })
    }

    /// A configuration with a single endpoint and empty directories, for
    /// tests that only exercise the detector logic.
    pub fn for_test() -> Self {
        EngineConfig {
            rpc_endpoints: vec![RpcEndpointConfig {
                url: "http://localhost:0".to_string(),
                weight: 10,
                label: "test".to_string(),
            }],
            known_exchange_addresses: HashSet::new(),
            jito_tip_accounts: default_jito_accounts(),
            cex_deposit_addresses: HashMap::new(),
            swap_service_addresses: HashMap::new(),
            mixer_addresses: HashMap::new(),
            bridge_addresses: HashMap::new(),
            official_token_mint_address: None,
            analysis_timeout_ms: 30_000,
            deduplication_window_ms: 30_000,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter: 0.20,
            api_keys: vec![],
            rate_limit_per_minute: 60,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn read_set_env(key: &str) -> HashSet<String> {
    read_set_env_or(key, HashSet::new())
}

fn read_set_env_or(key: &str, default: HashSet<String>) -> HashSet<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}

fn read_directory_env(key: &str) -> HashMap<String, HashSet<String>> {
    env::var(key)
        .ok()
        .and_then(|raw| serde_json::from_str::<HashMap<String, HashSet<String>>>(&raw).ok())
        .unwrap_or_default()
}

/// Eight well-known Jito tip-relay accounts, used as the default when the
/// operator hasn't supplied an override.
fn default_jito_accounts() -> HashSet<String> {
    [
        "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
        "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
        "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
        "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
        "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
        "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
        "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumxoBr1QZi",
        "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
