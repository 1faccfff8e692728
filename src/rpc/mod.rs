pub mod client;
pub mod gateway;

pub use client::{LedgerRpc, SolanaRpc};
pub use gateway::{ConfirmationPolicy, RpcGateway, RpcStats, RpcStatsSnapshot};
