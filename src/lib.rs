// lib.rs - 导出公共接口供 CLI 与测试使用

pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod keystore;
pub mod monitor;
pub mod network;
pub mod price;
pub mod rpc;
pub mod tokens;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型
pub use agent::{AgentStatus, TransferReceipt, WalletAgent};
pub use config::Config;
pub use error::{AgentError, Result};
pub use executor::{SwapOutcome, TransactionBuilder};
pub use keystore::KeyStore;
pub use network::{Network, NetworkPolicy};
pub use price::PriceCache;
pub use rpc::RpcGateway;
