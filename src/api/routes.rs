/// HTTP route handlers for the analysis API (spec §6 downstream surface).
use crate::api::responses::{AnalyzeResponse, ErrorResponse, TraceResponse};
use crate::api::server::AppState;
use crate::core::errors::EngineError;
use crate::metrics::Timer;
use crate::oracle::MarketDataOracle;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    pub bypass_cache: bool,
}

pub async fn analyze_mint<O: MarketDataOracle + 'static>(
    state: web::Data<AppState<O>>,
    path: web::Path<String>,
    query: web::Query<AnalyzeQuery>,
) -> HttpResponse {
    let mint = path.into_inner();
    let timer = Timer::new();

    let result = state.fusion.analyze(&mint, query.bypass_cache).await;

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&["POST", "/api/v1/analyze"])
        .observe(timer.elapsed_secs());

    match result {
        Ok(report) => {
            crate::metrics::HTTP_REQUESTS_TOTAL
                .with_label_values(&["POST", "/api/v1/analyze", "200"])
                .inc();
            HttpResponse::Ok().json(AnalyzeResponse::from(report.as_ref()))
        }
        Err(EngineError::InvalidInput(msg)) => {
            crate::metrics::HTTP_REQUESTS_TOTAL
                .with_label_values(&["POST", "/api/v1/analyze", "400"])
                .inc();
            HttpResponse::BadRequest().json(ErrorResponse {
                error: "invalid_input".to_string(),
                message: msg,
            })
        }
        Err(e) => {
            crate::metrics::HTTP_REQUESTS_TOTAL
                .with_label_values(&["POST", "/api/v1/analyze", "502"])
                .inc();
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "analysis_failed".to_string(),
                message: e.to_string(),
            })
        }
    }
}

pub async fn trace_wallet<O: MarketDataOracle + 'static>(
    state: web::Data<AppState<O>>,
    path: web::Path<String>,
) -> HttpResponse {
    let wallet = path.into_inner();
    let timer = Timer::new();

    let result = state.tracer.trace(&wallet).await;

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&["GET", "/api/v1/trace"])
        .observe(timer.elapsed_secs());

    match result {
        Ok(report) => {
            crate::metrics::HTTP_REQUESTS_TOTAL
                .with_label_values(&["GET", "/api/v1/trace", "200"])
                .inc();
            HttpResponse::Ok().json(TraceResponse::from(&report))
        }
        Err(e) => {
            crate::metrics::HTTP_REQUESTS_TOTAL
                .with_label_values(&["GET", "/api/v1/trace", "502"])
                .inc();
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "trace_failed".to_string(),
                message: e.to_string(),
            })
        }
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(crate::metrics::gather_metrics())
}
