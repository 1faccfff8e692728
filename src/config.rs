use anyhow::{Context, Result};
use serde::Deserialize;
use solana_commitment_config::CommitmentConfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::jupiter::DEFAULT_JUPITER_API;
use crate::keystore::default_store_path;
use crate::monitor::{DEFAULT_BALANCE_WATCH_INTERVAL_SECS, DEFAULT_PRICE_WATCH_INTERVAL_SECS};
use crate::network::{Network, NetworkPolicy};
use crate::price::DEFAULT_PRICE_TTL_SECS;
use crate::rpc::ConfirmationPolicy;

pub const DEFAULT_COINGECKO_API: &str = "https://api.coingecko.com/api/v3";

/// 全局配置
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_cluster")]
    pub solana_cluster: String,
    /// 主网 RPC（仅 mainnet 生效）
    pub solana_rpc_url: Option<String>,
    /// 任意集群的 RPC 覆盖
    pub custom_rpc_url: Option<String>,
    #[serde(default = "default_commitment")]
    pub commitment_level: String,

    // 钱包配置
    pub wallet_path: Option<PathBuf>,

    // 外部服务
    #[serde(default = "default_jupiter_api")]
    pub jupiter_api_url: String,
    #[serde(default = "default_coingecko_api")]
    pub coingecko_api_url: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    // 价格缓存
    #[serde(default = "default_price_ttl")]
    pub price_ttl_secs: i64,

    // 交易参数
    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u16,

    // 确认轮询（0 = 发送后立即返回）
    #[serde(default)]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_confirm_poll_interval")]
    pub confirm_poll_interval_ms: u64,

    // 监控参数
    #[serde(default = "default_balance_watch_interval")]
    pub balance_watch_interval_secs: u64,
    #[serde(default = "default_price_watch_interval")]
    pub price_watch_interval_secs: u64,
}

fn default_cluster() -> String {
    Network::Devnet.to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_jupiter_api() -> String {
    DEFAULT_JUPITER_API.to_string()
}

fn default_coingecko_api() -> String {
    DEFAULT_COINGECKO_API.to_string()
}

fn default_http_timeout() -> u64 {
    15
}

fn default_price_ttl() -> i64 {
    DEFAULT_PRICE_TTL_SECS
}

fn default_slippage_bps() -> u16 {
    50
}

fn default_confirm_poll_interval() -> u64 {
    500
}

fn default_balance_watch_interval() -> u64 {
    DEFAULT_BALANCE_WATCH_INTERVAL_SECS
}

fn default_price_watch_interval() -> u64 {
    DEFAULT_PRICE_WATCH_INTERVAL_SECS
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = envy::from_env::<Config>()
            .context("Failed to load configuration from environment variables")?;

        config.validate()?;

        Ok(config)
    }

    /// 验证配置参数
    fn validate(&self) -> Result<()> {
        self.network()?;

        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be > 0");
        }

        if self.price_ttl_secs < 0 {
            anyhow::bail!("price_ttl_secs must be >= 0");
        }

        // 10000 bps = 100%
        if self.default_slippage_bps > 10_000 {
            anyhow::bail!("default_slippage_bps must be between 0 and 10000");
        }

        if self.confirm_timeout_secs > 0 && self.confirm_poll_interval_ms == 0 {
            anyhow::bail!("confirm_poll_interval_ms must be > 0 when confirmation polling is enabled");
        }

        if self.balance_watch_interval_secs == 0 || self.price_watch_interval_secs == 0 {
            anyhow::bail!("watch intervals must be > 0");
        }

        for (name, url) in [
            ("jupiter_api_url", &self.jupiter_api_url),
            ("coingecko_api_url", &self.coingecko_api_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
            }
        }

        Ok(())
    }

    pub fn network(&self) -> Result<Network> {
        self.solana_cluster
            .parse::<Network>()
            .with_context(|| format!("invalid solana_cluster '{}'", self.solana_cluster))
    }

    /// CLI 的集群 / RPC 参数优先于环境变量
    pub fn network_policy(&self, cluster: Option<Network>, rpc_override: Option<&str>) -> Result<NetworkPolicy> {
        let network = match cluster {
            Some(network) => network,
            None => self.network()?,
        };
        let custom = rpc_override.or(self.custom_rpc_url.as_deref());
        Ok(NetworkPolicy::resolve(network, custom, self.solana_rpc_url.as_deref()))
    }

    pub fn wallet_path(&self) -> PathBuf {
        self.wallet_path.clone().unwrap_or_else(default_store_path)
    }

    /// 获取 CommitmentConfig
    pub fn get_commitment_config(&self) -> CommitmentConfig {
        match self.commitment_level.to_lowercase().as_str() {
            "processed" => CommitmentConfig::processed(),
            "confirmed" => CommitmentConfig::confirmed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => {
                log::warn!("⚠️  未知的 commitment_level: {}, 使用默认值 'confirmed'", self.commitment_level);
                CommitmentConfig::confirmed()
            }
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn price_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.price_ttl_secs)
    }

    pub fn confirmation_policy(&self) -> Option<ConfirmationPolicy> {
        ConfirmationPolicy::from_secs(self.confirm_timeout_secs, self.confirm_poll_interval_ms)
    }

    /// 打印配置摘要
    pub fn print_summary(&self, policy: &NetworkPolicy) {
        log::info!("=== Configuration Summary ===");
        log::info!("Network:");
        log::info!("  Cluster: {}", policy.network());
        log::info!("  RPC: {}", policy.rpc_url());
        log::info!("  Commitment: {}", self.commitment_level);
        log::info!("  Airdrop: {}", if policy.permits_airdrop() { "ENABLED" } else { "DISABLED" });
        log::info!("  Swap Execution: {}", if policy.permits_swap_execution() { "ENABLED" } else { "PREVIEW ONLY" });
        log::info!("");
        log::info!("Wallet:");
        log::info!("  Path: {}", self.wallet_path().display());
        log::info!("");
        log::info!("Services:");
        log::info!("  Aggregator: {}", self.jupiter_api_url);
        log::info!("  Price Source: {}", self.coingecko_api_url);
        log::info!("  HTTP Timeout: {}s", self.http_timeout_secs);
        log::info!("  Price TTL: {}s", self.price_ttl_secs);
        log::info!("");
        log::info!("Trading:");
        log::info!("  Default Slippage: {} bps", self.default_slippage_bps);
        match self.confirmation_policy() {
            Some(p) => log::info!("  Confirmation: poll every {:?}, up to {:?}", p.poll_interval, p.timeout),
            None => log::info!("  Confirmation: DISABLED (fire-and-forget)"),
        }
        log::info!("=============================");
    }
}
