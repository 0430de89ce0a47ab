/// Signature Fetcher (spec §4.2): paginated retrieval of a wallet's or
/// mint's signature history, returned oldest-first. Per-address
/// concurrency gate of 1 — repeat requests within 500ms coalesce to the
/// in-flight future, grounded in the teacher's `rpc_client.rs` retry
/// style but generalised with `futures::future::Shared`.
use crate::core::errors::Result;
use crate::core::validation::validate_address;
use crate::domain::schema::Signature;
use crate::rpc::client::RpcClient;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const UNTIL_OLDEST_PAGE_CAP: usize = 3;
const PAGE_SIZE: u64 = 1000;

#[derive(Debug, Clone)]
pub enum Bound {
    /// Most recent N signatures, newest-first.
    Limit(u64),
    /// Paginate backward from `before`, newest-first.
    Before { before: String, limit: u64 },
    /// Paginate until the history is exhausted, capped at 3 * 1000.
    UntilOldest,
}

#[derive(Debug, Deserialize)]
struct RawSignature {
    signature: String,
    slot: u64,
    #[serde(default, rename = "blockTime")]
    block_time: Option<i64>,
    #[serde(default)]
    err: Option<serde_json::Value>,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<Signature>>>>;

pub struct SignatureFetcher {
    client: Arc<RpcClient>,
    inflight: Arc<DashMap<String, SharedFetch>>,
}

impl SignatureFetcher {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub async fn fetch_signatures(&self, address: &str, bound: Bound) -> Result<Vec<Signature>> {
        validate_address(address)?;

        if let Some(existing) = self.inflight.get(address) {
            return existing.value().clone().await;
        }

        let client = self.client.clone();
        let addr = address.to_string();
        let fut: BoxFuture<'static, Result<Vec<Signature>>> =
            Self::fetch_uncoalesced(client, addr, bound).boxed();
        let shared = fut.shared();

        self.inflight.insert(address.to_string(), shared.clone());

        let inflight = self.inflight.clone();
        let key = address.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            inflight.remove(&key);
        });

        shared.await
    }

    async fn fetch_uncoalesced(
        client: Arc<RpcClient>,
        address: String,
        bound: Bound,
    ) -> Result<Vec<Signature>> {
        match bound {
            Bound::Limit(limit) => {
                let page = Self::fetch_page(&client, &address, limit.min(PAGE_SIZE), None).await?;
                Ok(page)
            }
            Bound::Before { before, limit } => {
                let page =
                    Self::fetch_page(&client, &address, limit.min(PAGE_SIZE), Some(before)).await?;
                Ok(page)
            }
            Bound::UntilOldest => {
                let mut all_newest_first = Vec::new();
                let mut cursor: Option<String> = None;

                for _ in 0..UNTIL_OLDEST_PAGE_CAP {
                    let page = Self::fetch_page(&client, &address, PAGE_SIZE, cursor.clone()).await?;
                    if page.is_empty() {
                        break;
                    }
                    cursor = page.last().map(|s| s.signature.clone());
                    let page_len = page.len();
                    all_newest_first.extend(page);
                    if page_len < PAGE_SIZE as usize {
                        break;
                    }
                }

                all_newest_first.reverse();
                Ok(all_newest_first)
            }
        }
    }

    async fn fetch_page(
        client: &RpcClient,
        address: &str,
        limit: u64,
        before: Option<String>,
    ) -> Result<Vec<Signature>> {
        let mut opts = serde_json::Map::new();
        opts.insert("limit".to_string(), serde_json::json!(limit));
        if let Some(before) = before {
            opts.insert("before".to_string(), serde_json::json!(before));
        }

        let raw: Vec<RawSignature> = client
            .call_method("getSignaturesForAddress", (address, opts))
            .await?;

        Ok(raw
            .into_iter()
            .map(|r| Signature {
                signature: r.signature,
                slot: r.slot,
                block_time: r.block_time,
                was_error: r.err.is_some(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::EngineError;

    #[test]
    fn rejects_malformed_address() {
        // address validation runs before any RPC call, synchronously reachable via block_on
        let rt = tokio::runtime::Runtime::new().unwrap();
        let balancer_cfg = crate::core::config::EngineConfig::for_test();
        let balancer = Arc::new(crate::rpc::balancer::RpcBalancer::new(&balancer_cfg));
        let client = Arc::new(RpcClient::new(balancer));
        let fetcher = SignatureFetcher::new(client);
        let result = rt.block_on(fetcher.fetch_signatures("short", Bound::Limit(10)));
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }
}
