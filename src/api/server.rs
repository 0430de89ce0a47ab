/// Actix-web bootstrap for the analysis API.
use crate::api::routes;
use crate::fusion::FusionAggregator;
use crate::middleware::{ApiKeyAuth, RateLimiter, RateLimiterConfig};
use crate::oracle::MarketDataOracle;
use crate::tracer::OnChainTracer;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

pub struct AppState<O: MarketDataOracle> {
    pub fusion: Arc<FusionAggregator<O>>,
    pub tracer: Arc<OnChainTracer>,
}

pub async fn start_server<O: MarketDataOracle + 'static>(
    fusion: Arc<FusionAggregator<O>>,
    tracer: Arc<OnChainTracer>,
    rate_limit_per_minute: u32,
    api_keys: Vec<String>,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    let state = web::Data::new(AppState { fusion, tracer });
    let rate_limiter_config = RateLimiterConfig {
        requests_per_minute: rate_limit_per_minute,
        burst_size: (rate_limit_per_minute / 4).max(1),
    };

    tracing::info!(%host, %port, "starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(crate::middleware::RequestId::new())
            .wrap(RateLimiter::with_config(rate_limiter_config.clone()))
            // Registered last so it runs first: stamps a validated
            // `ApiKey` into request extensions before the rate limiter
            // decides which quota tier applies.
            .wrap(ApiKeyAuth::new(api_keys.clone()))
            .route("/health", web::get().to(routes::health))
            .route("/metrics", web::get().to(routes::metrics))
            .service(
                web::scope("/api/v1")
                    .route("/analyze/{mint}", web::post().to(routes::analyze_mint::<O>))
                    .route("/trace/{wallet}", web::get().to(routes::trace_wallet::<O>)),
            )
    })
    .bind((host, port))?
    .run()
    .await
}
