//! 网络策略
//!
//! 所有 "当前是哪个集群" 的判断都集中在 `NetworkPolicy` 上，
//! RpcGateway 与 SwapOrchestrator 只询问策略，不再比较网络名字符串。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AgentError;

pub const DEVNET_RPC: &str = "https://api.devnet.solana.com";
pub const TESTNET_RPC: &str = "https://api.testnet.solana.com";
pub const MAINNET_RPC: &str = "https://api.mainnet-beta.solana.com";

const EXPLORER_TX_URL: &str = "https://explorer.solana.com/tx";

/// Solana 集群
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Devnet,
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "devnet" | "dev" => Ok(Network::Devnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "mainnet" | "mainnet-beta" | "main" => Ok(Network::Mainnet),
            other => Err(AgentError::Config(format!("Unknown cluster: {}", other))),
        }
    }
}

/// 网络策略：集群身份 + RPC 端点 + 由此推导出的功能开关
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPolicy {
    network: Network,
    rpc_url: String,
}

impl NetworkPolicy {
    /// 按集群选择端点
    ///
    /// - `custom_rpc` 对任意集群生效（对应 `--rpc`）
    /// - mainnet 允许 `SOLANA_RPC_URL` 覆盖公共端点
    /// - devnet / testnet 固定使用公共端点
    pub fn resolve(network: Network, custom_rpc: Option<&str>, mainnet_override: Option<&str>) -> Self {
        let rpc_url = match (custom_rpc, network) {
            (Some(url), _) => url.to_string(),
            (None, Network::Mainnet) => mainnet_override.unwrap_or(MAINNET_RPC).to_string(),
            (None, Network::Devnet) => DEVNET_RPC.to_string(),
            (None, Network::Testnet) => TESTNET_RPC.to_string(),
        };
        Self { network, rpc_url }
    }

    pub fn new(network: Network, rpc_url: impl Into<String>) -> Self {
        Self { network, rpc_url: rpc_url.into() }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn is_production(&self) -> bool {
        self.network == Network::Mainnet
    }

    /// devnet 与 testnet 都放行空投，主网拒绝
    pub fn permits_airdrop(&self) -> bool {
        !self.is_production()
    }

    /// 聚合器只在主网上有可执行的路由
    pub fn permits_swap_execution(&self) -> bool {
        self.is_production()
    }

    pub fn explorer_tx_url(&self, signature: &str) -> String {
        match self.network {
            Network::Mainnet => format!("{}/{}", EXPLORER_TX_URL, signature),
            other => format!("{}/{}?cluster={}", EXPLORER_TX_URL, signature, other),
        }
    }
}
