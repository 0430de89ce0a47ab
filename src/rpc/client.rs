/// Thin JSON-RPC transport used underneath the balancer. Adapted from the
/// teacher's `core/rpc_client.rs` request plumbing, but every call is
/// routed through `RpcBalancer::call` instead of hard-coding one endpoint.
use crate::core::errors::{EngineError, Result};
use crate::rpc::balancer::{CallOutcome, RpcBalancer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, serde::Deserialize)]
struct RpcEnvelope<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, serde::Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct RpcClient {
    http: reqwest::Client,
    balancer: Arc<RpcBalancer>,
}

impl RpcClient {
    pub fn new(balancer: Arc<RpcBalancer>) -> Self {
        let http = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(8))
            .timeout(Duration::from_secs(25))
            .build()
            .expect("failed to build reqwest client");
        Self { http, balancer }
    }

    pub async fn call_method<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        let params_value = serde_json::to_value(params)
            .map_err(|e| EngineError::InvalidInput(format!("bad RPC params: {e}")))?;

        let timer = crate::metrics::Timer::new();
        let result = self
            .balancer
            .call(|endpoint| {
                let http = self.http.clone();
                let method = method.to_string();
                let params_value = params_value.clone();
                async move {
                    let body = serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "method": method,
                        "params": params_value,
                    });

                    let resp = match http.post(&endpoint.url).json(&body).send().await {
                        Ok(r) => r,
                        Err(e) => {
                            return (
                                Err(EngineError::TransientRpc(e.to_string())),
                                CallOutcome::HardFailure,
                            )
                        }
                    };

                    let status = resp.status();
                    if status.as_u16() == 429 {
                        return (
                            Err(EngineError::RateLimited(format!("{} rate limited", endpoint.label))),
                            CallOutcome::SoftFailure,
                        );
                    }
                    if status.is_server_error() {
                        return (
                            Err(EngineError::TransientRpc(format!("HTTP {status}"))),
                            CallOutcome::HardFailure,
                        );
                    }

                    let text = match resp.text().await {
                        Ok(t) => t,
                        Err(e) => {
                            return (
                                Err(EngineError::TransientRpc(e.to_string())),
                                CallOutcome::HardFailure,
                            )
                        }
                    };

                    let envelope: RpcEnvelope<R> = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            return (
                                Err(EngineError::MalformedResponse(e.to_string())),
                                CallOutcome::HardFailure,
                            )
                        }
                    };

                    if let Some(err) = envelope.error {
                        if err.code == 429 {
                            return (
                                Err(EngineError::RateLimited(err.message)),
                                CallOutcome::SoftFailure,
                            );
                        }
                        return (
                            Err(EngineError::MalformedResponse(format!(
                                "RPC error {}: {}",
                                err.code, err.message
                            ))),
                            CallOutcome::HardFailure,
                        );
                    }

                    match envelope.result {
                        Some(result) => (Ok(result), CallOutcome::Success),
                        None => (
                            Err(EngineError::MalformedResponse("empty result".to_string())),
                            CallOutcome::HardFailure,
                        ),
                    }
                }
            })
            .await;

        crate::metrics::RPC_DURATION
            .with_label_values(&[method])
            .observe(timer.elapsed_secs());
        crate::metrics::RPC_CALLS
            .with_label_values(&[method, if result.is_ok() { "ok" } else { "failed" }])
            .inc();

        result
    }

    /// Lightweight "current slot" call used by the heartbeat (spec §4.1).
    pub async fn heartbeat_ping(&self) {
        self.balancer
            .heartbeat_once(|endpoint| {
                let http = self.http.clone();
                async move {
                    let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "getSlot"});
                    matches!(
                        http.post(&endpoint.url).json(&body).send().await,
                        Ok(resp) if resp.status().is_success()
                    )
                }
            })
            .await;
    }

}
