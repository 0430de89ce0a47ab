use std::sync::Arc;
use token_risk_engine::core::config::EngineConfig;
use token_risk_engine::domain::exchange::{EntityDirectory, ExchangeWhitelist};
use token_risk_engine::fusion::FusionAggregator;
use token_risk_engine::oracle::{CachedOracle, InMemoryOracle};
use token_risk_engine::rpc::{RpcBalancer, RpcClient, SignatureFetcher};
use token_risk_engine::tracer::OnChainTracer;
use token_risk_engine::{api, metrics};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("🚀 token-risk-engine - Solana token risk analysis engine");
    info!("Version: 0.1.0");

    metrics::init_metrics();
    info!("📊 Metrics initialized");

    let config = Arc::new(EngineConfig::from_env()?);
    info!(
        "📡 RPC pool: {} endpoint(s)",
        config.rpc_endpoints.len()
    );

    let balancer = Arc::new(RpcBalancer::new(&config));
    let rpc = Arc::new(RpcClient::new(balancer));
    let signatures = Arc::new(SignatureFetcher::new(rpc.clone()));
    info!("✅ RPC balancer and signature fetcher initialized");

    // Background heartbeat (spec §4.1): pings every endpoint once per 30s
    // so a downed endpoint's score and circuit breaker can recover even
    // without live request traffic.
    tokio::spawn({
        let rpc = rpc.clone();
        async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                ticker.tick().await;
                rpc.heartbeat_ping().await;
            }
        }
    });
    info!("💓 RPC heartbeat loop started (30s interval)");

    let exchanges = Arc::new(ExchangeWhitelist::new(config.known_exchange_addresses.clone()));
    let entities = Arc::new(EntityDirectory::new(
        config.cex_deposit_addresses.clone(),
        config.swap_service_addresses.clone(),
        config.mixer_addresses.clone(),
        config.bridge_addresses.clone(),
    ));
    info!("✅ Exchange whitelist and entity directory loaded");

    // The cache-fronted in-memory oracle is the adapter point a real
    // DexScreener/Rugcheck/GoPlus/Birdeye-backed `MarketDataOracle` plugs
    // into; nothing downstream of `FusionAggregator` depends on which
    // implementation is wired in here.
    let oracle = Arc::new(CachedOracle::new(InMemoryOracle::new()));

    let fusion = Arc::new(FusionAggregator::new(
        oracle,
        rpc.clone(),
        signatures,
        exchanges.clone(),
        entities.clone(),
        config.clone(),
    ));
    info!("✅ Fusion aggregator initialized");

    let tracer = Arc::new(OnChainTracer::new(rpc.clone(), entities, exchanges));
    info!("✅ On-chain tracer initialized");

    info!(
        "🚦 Rate limiting: {} requests/minute (per-IP, higher for API-key holders)",
        config.rate_limit_per_minute
    );

    let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let api_port = std::env::var("API_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()?;

    info!("🌐 Starting REST API server on {}:{}", api_host, api_port);

    api::start_server(
        fusion,
        tracer,
        config.rate_limit_per_minute,
        config.api_keys.clone(),
        &api_host,
        api_port,
    )
    .await?;

    Ok(())
}
