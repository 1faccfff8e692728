//! 价格缓存
//!
//! 查询流程:
//! 1. 符号转大写；稳定币直接返回 1.0（不缓存、不请求）
//! 2. TTL 内的缓存直接返回
//! 3. 符号 → 价格源 id（未知符号报错，不缓存）
//! 4. 请求价格源；失败时回退到过期缓存，没有缓存则返回空

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::tokens::{price_source_id, supported_price_symbols, STABLE_SYMBOL};

pub const DEFAULT_PRICE_TTL_SECS: i64 = 30;

/// 可注入的时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 外部价格源
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// 按价格源 id 查询美元价格
    async fn fetch_usd(&self, source_id: &str) -> Result<f64>;
}

/// CoinGecko `/simple/price`
pub struct CoinGeckoClient {
    base_url: String,
    http_client: Client,
}

impl CoinGeckoClient {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_usd(&self, source_id: &str) -> Result<f64> {
        let response = self
            .http_client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", source_id), ("vs_currencies", "usd")])
            .send()
            .await?;

        classify_price_status(response.status())?;

        let body: serde_json::Value = response.json().await?;
        parse_simple_price(&body, source_id)
    }
}

/// 429 → `RateLimited`，其他非 2xx → `Network`
pub fn classify_price_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AgentError::RateLimited(format!("price source returned {}", status)));
    }
    if !status.is_success() {
        return Err(AgentError::Network(format!("price source returned {}", status)));
    }
    Ok(())
}

/// 解析 `{<id>: {usd: number}}`
pub fn parse_simple_price(body: &serde_json::Value, source_id: &str) -> Result<f64> {
    body.get(source_id)
        .and_then(|entry| entry.get("usd"))
        .and_then(|v| v.as_f64())
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| AgentError::Network(format!("no usd price for '{}' in response", source_id)))
}

/// 价格来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceOrigin {
    /// 稳定币常量
    Stable,
    /// 本次请求得到
    Fresh,
    /// TTL 内的缓存
    Cached,
    /// 请求失败后回退的过期缓存
    StaleFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub price: f64,
    pub origin: PriceOrigin,
}

#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    price: f64,
    fetched_at: DateTime<Utc>,
}

pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<String, PriceEntry>,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn with_system_clock(source: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self::new(source, Arc::new(SystemClock), ttl)
    }

    /// 美元价格；请求失败且无缓存时返回 `None`
    pub async fn get(&self, symbol: &str) -> Result<Option<f64>> {
        Ok(self.lookup(symbol).await?.map(|p| p.price))
    }

    /// 带来源信息的查询
    pub async fn lookup(&self, symbol: &str) -> Result<Option<PricePoint>> {
        let key = symbol.trim().to_uppercase();

        if key == STABLE_SYMBOL {
            return Ok(Some(PricePoint { price: 1.0, origin: PriceOrigin::Stable }));
        }

        let now = self.clock.now();
        if let Some(entry) = self.entries.get(&key).map(|e| *e) {
            if now - entry.fetched_at < self.ttl {
                debug!("💾 价格缓存命中: {} = ${}", key, entry.price);
                return Ok(Some(PricePoint { price: entry.price, origin: PriceOrigin::Cached }));
            }
        }

        let source_id = price_source_id(&key).ok_or_else(|| {
            AgentError::UnknownToken(format!(
                "{} (supported: {})",
                key,
                supported_price_symbols().join(", ")
            ))
        })?;

        match self.source.fetch_usd(source_id).await {
            Ok(price) => {
                self.entries.insert(key.clone(), PriceEntry { price, fetched_at: now });
                debug!("💱 价格已更新: {} = ${}", key, price);
                Ok(Some(PricePoint { price, origin: PriceOrigin::Fresh }))
            }
            Err(e) => {
                match &e {
                    AgentError::RateLimited(_) => debug!("价格源限流: {}", e),
                    _ => warn!("⚠️  价格获取失败 {}: {}", key, e),
                }
                Ok(self.entries.get(&key).map(|entry| PricePoint {
                    price: entry.price,
                    origin: PriceOrigin::StaleFallback,
                }))
            }
        }
    }

    /// 批量查询，只返回有价格的符号
    pub async fn get_many(&self, symbols: &[&str]) -> HashMap<String, f64> {
        let mut prices = HashMap::new();
        for symbol in symbols {
            match self.get(symbol).await {
                Ok(Some(price)) => {
                    prices.insert(symbol.trim().to_uppercase(), price);
                }
                Ok(None) => {}
                Err(e) => warn!("⚠️  {}", e),
            }
        }
        prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePriceSource, ManualClock};
    use serde_json::json;

    fn cache(source: Arc<FakePriceSource>, clock: Arc<ManualClock>) -> PriceCache {
        PriceCache::new(source, clock, Duration::seconds(DEFAULT_PRICE_TTL_SECS))
    }

    #[tokio::test]
    async fn test_stable_symbol_never_fetches() {
        let source = Arc::new(FakePriceSource::new(150.0));
        let cache = cache(source.clone(), Arc::new(ManualClock::new()));

        assert_eq!(cache.get("USDC").await.unwrap(), Some(1.0));
        assert_eq!(cache.get("usdc").await.unwrap(), Some(1.0));
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_within_ttl_fetches_once() {
        let source = Arc::new(FakePriceSource::new(150.0));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(source.clone(), clock.clone());

        let first = cache.get("sol").await.unwrap();
        source.set_price(Some(999.0));
        clock.advance(Duration::seconds(29));
        let second = cache.get("SOL").await.unwrap();

        assert_eq!(first, Some(150.0));
        assert_eq!(first, second);
        assert_eq!(source.fetches(), 1);
        assert_eq!(
            cache.lookup("SOL").await.unwrap().unwrap().origin,
            PriceOrigin::Cached
        );
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let source = Arc::new(FakePriceSource::new(150.0));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(source.clone(), clock.clone());

        cache.get("SOL").await.unwrap();
        source.set_price(Some(160.0));
        clock.advance(Duration::seconds(30));

        let p = cache.lookup("SOL").await.unwrap().unwrap();
        assert_eq!(p, PricePoint { price: 160.0, origin: PriceOrigin::Fresh });
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_failure() {
        let source = Arc::new(FakePriceSource::new(150.0));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(source.clone(), clock.clone());

        cache.get("BONK").await.unwrap();
        clock.advance(Duration::minutes(5));
        source.set_rate_limited(true);

        let p = cache.lookup("BONK").await.unwrap().unwrap();
        assert_eq!(p, PricePoint { price: 150.0, origin: PriceOrigin::StaleFallback });

        source.set_rate_limited(false);
        source.set_price(None);
        assert_eq!(cache.get("BONK").await.unwrap(), Some(150.0));
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_empty() {
        let source = Arc::new(FakePriceSource::new(150.0));
        source.set_price(None);
        let cache = cache(source.clone(), Arc::new(ManualClock::new()));

        assert_eq!(cache.get("JUP").await.unwrap(), None);
        // 失败不会写入缓存
        source.set_price(Some(1.2));
        assert_eq!(cache.get("JUP").await.unwrap(), Some(1.2));
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let source = Arc::new(FakePriceSource::new(1.0));
        let cache = cache(source.clone(), Arc::new(ManualClock::new()));

        assert!(matches!(cache.get("DOGE").await, Err(AgentError::UnknownToken(_))));
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_get_many_skips_unknown() {
        let source = Arc::new(FakePriceSource::new(2.0));
        let cache = cache(source, Arc::new(ManualClock::new()));

        let prices = cache.get_many(&["sol", "usdc", "doge"]).await;
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["USDC"], 1.0);
        assert_eq!(prices["SOL"], 2.0);
    }

    #[test]
    fn test_parse_simple_price() {
        let body = json!({ "solana": { "usd": 142.37 } });
        assert_eq!(parse_simple_price(&body, "solana").unwrap(), 142.37);
        assert!(parse_simple_price(&body, "bonk").is_err());
        assert!(parse_simple_price(&json!({ "solana": {} }), "solana").is_err());
    }

    #[test]
    fn test_classify_price_status() {
        assert!(classify_price_status(StatusCode::OK).is_ok());
        assert!(matches!(
            classify_price_status(StatusCode::TOO_MANY_REQUESTS),
            Err(AgentError::RateLimited(_))
        ));
        assert!(matches!(
            classify_price_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(AgentError::Network(_))
        ));
        assert!(matches!(classify_price_status(StatusCode::NOT_FOUND), Err(AgentError::Network(_))));
    }
}
