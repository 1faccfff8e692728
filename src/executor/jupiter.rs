//! Swap 聚合器客户端 (Jupiter v6 接口形态)
//!
//! - `GET  /quote?inputMint&outputMint&amount&slippageBps`
//! - `POST /swap {quoteResponse, userPublicKey, wrapAndUnwrapSol}` → `{swapTransaction: base64}`

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::types::Quote;

pub const DEFAULT_JUPITER_API: &str = "https://quote-api.jup.ag/v6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
}

/// 聚合器接口
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    /// 获取报价；任何非成功响应都返回 `Quote` 错误
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;

    /// 获取预构建的 swap 交易字节（bincode 编码的 VersionedTransaction）
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestBody<'a> {
    quote_response: &'a serde_json::Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

pub struct JupiterClient {
    base_url: String,
    http_client: Client,
}

impl JupiterClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;

        info!("🪐 聚合器客户端已初始化: {}", base_url);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl SwapAggregator for JupiterClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        debug!(
            "📊 请求报价: {} -> {} amount={} slippage={}bps",
            request.input_mint, request.output_mint, request.amount, request.slippage_bps
        );

        let response = self
            .http_client
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", request.input_mint.to_string()),
                ("outputMint", request.output_mint.to_string()),
                ("amount", request.amount.to_string()),
                ("slippageBps", request.slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::Quote(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Quote(format!("read body: {}", e)))?;

        parse_quote_response(status, &body)
    }

    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<Vec<u8>> {
        let body = SwapRequestBody {
            quote_response: &quote.raw,
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
        };

        let response = self
            .http_client
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_swap_response(status, &body)
    }
}

/// `/quote` 响应：非 2xx、格式错误、带 `error` 字段都视为报价失败
pub fn parse_quote_response(status: StatusCode, body: &str) -> Result<Quote> {
    if !status.is_success() {
        return Err(AgentError::Quote(format!("HTTP {}: {}", status, body)));
    }

    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AgentError::Quote(format!("malformed quote: {}", e)))?;
    if let Some(err) = raw.get("error") {
        return Err(AgentError::Quote(err.to_string()));
    }

    Quote::from_response(raw)
}

/// `/swap` 响应 → 交易字节
pub fn parse_swap_response(status: StatusCode, body: &str) -> Result<Vec<u8>> {
    if !status.is_success() {
        return Err(AgentError::Network(format!("swap endpoint HTTP {}: {}", status, body)));
    }

    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AgentError::Network(format!("malformed swap response: {}", e)))?;
    let encoded = json
        .get("swapTransaction")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::Network("swap response missing swapTransaction".into()))?;

    STANDARD
        .decode(encoded)
        .map_err(|e| AgentError::Decode(format!("swapTransaction base64: {}", e)))
}
