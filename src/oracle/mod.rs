/// `MarketDataOracle` — thin adapter over external price/pair APIs
/// (DexScreener, Rugcheck, GoPlus, Birdeye), cache-fronted (spec §4).
///
/// The core never calls a vendor API directly; every external
/// enrichment call goes through this trait, consolidating what used to
/// be scattered across the teacher's `price/jupiter.rs`,
/// `price/enrichment.rs`, and `dex/raydium.rs` into the single adapter
/// point Design Notes §9 calls for. The cache wrapper reuses the
/// teacher's `cache/mod.rs` `ResponseCache<T>`.
use crate::cache::ResponseCache;
use crate::core::errors::Result;
use crate::domain::schema::Holder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenOverview {
    pub price: f64,
    pub mcap: f64,
    pub liquidity: f64,
    pub volume_24h: f64,
    pub lp_burned: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub t: i64,
    pub v: f64,
}

#[async_trait]
pub trait MarketDataOracle: Send + Sync {
    async fn overview(&self, mint: &str) -> Result<TokenOverview>;
    async fn price_history(&self, mint: &str, days: u32) -> Result<Vec<PricePoint>>;
    async fn top_holders(&self, mint: &str) -> Result<Vec<Holder>>;
}

/// Cache-fronted wrapper around any `MarketDataOracle`, matching the
/// teacher's `CacheManager` TTL tiers (`cache/mod.rs`).
pub struct CachedOracle<O: MarketDataOracle> {
    inner: O,
    overview_cache: ResponseCache<TokenOverview>,
    holders_cache: ResponseCache<Vec<Holder>>,
}

impl<O: MarketDataOracle> CachedOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            overview_cache: ResponseCache::new(60),
            holders_cache: ResponseCache::new(30),
        }
    }
}

#[async_trait]
impl<O: MarketDataOracle> MarketDataOracle for CachedOracle<O> {
    async fn overview(&self, mint: &str) -> Result<TokenOverview> {
        if let Some(cached) = self.overview_cache.get(mint) {
            return Ok(cached);
        }
        let fresh = self.inner.overview(mint).await?;
        self.overview_cache.set(mint.to_string(), fresh.clone());
        Ok(fresh)
    }

    async fn price_history(&self, mint: &str, days: u32) -> Result<Vec<PricePoint>> {
        self.inner.price_history(mint, days).await
    }

    async fn top_holders(&self, mint: &str) -> Result<Vec<Holder>> {
        if let Some(cached) = self.holders_cache.get(mint) {
            return Ok(cached);
        }
        let fresh = self.inner.top_holders(mint).await?;
        self.holders_cache.set(mint.to_string(), fresh.clone());
        Ok(fresh)
    }
}

/// In-memory oracle for tests — the core is fully exercisable without a
/// live vendor integration, per Design Notes §9.
#[derive(Default, Clone)]
pub struct InMemoryOracle {
    pub overviews: Arc<dashmap::DashMap<String, TokenOverview>>,
    pub holders: Arc<dashmap::DashMap<String, Vec<Holder>>>,
    pub history: Arc<dashmap::DashMap<String, Vec<PricePoint>>>,
}

impl InMemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holders(self, mint: &str, holders: Vec<Holder>) -> Self {
        self.holders.insert(mint.to_string(), holders);
        self
    }

    pub fn with_overview(self, mint: &str, overview: TokenOverview) -> Self {
        self.overviews.insert(mint.to_string(), overview);
        self
    }
}

#[async_trait]
impl MarketDataOracle for InMemoryOracle {
    async fn overview(&self, mint: &str) -> Result<TokenOverview> {
        Ok(self.overviews.get(mint).map(|v| v.clone()).unwrap_or(TokenOverview {
            price: 0.0,
            mcap: 0.0,
            liquidity: 0.0,
            volume_24h: 0.0,
            lp_burned: None,
        }))
    }

    async fn price_history(&self, mint: &str, _days: u32) -> Result<Vec<PricePoint>> {
        Ok(self.history.get(mint).map(|v| v.clone()).unwrap_or_default())
    }

    async fn top_holders(&self, mint: &str) -> Result<Vec<Holder>> {
        Ok(self.holders.get(mint).map(|v| v.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_oracle_returns_configured_holders() {
        let oracle = InMemoryOracle::new().with_holders(
            "Mint1",
            vec![Holder {
                address: "Addr1".to_string(),
                balance: 100.0,
                percentage: 10.0,
                rank: 1,
            }],
        );
        let holders = oracle.top_holders("Mint1").await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].address, "Addr1");
    }

    #[tokio::test]
    async fn cached_oracle_returns_same_overview_without_recomputing() {
        let oracle = CachedOracle::new(
            InMemoryOracle::new().with_overview(
                "Mint1",
                TokenOverview {
                    price: 1.0,
                    mcap: 2.0,
                    liquidity: 3.0,
                    volume_24h: 4.0,
                    lp_burned: Some(true),
                },
            ),
        );
        let first = oracle.overview("Mint1").await.unwrap();
        let second = oracle.overview("Mint1").await.unwrap();
        assert_eq!(first.price, second.price);
    }
}
