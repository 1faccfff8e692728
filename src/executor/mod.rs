// 转账构建 / 签名 / 提交
pub mod builder;

// 聚合器客户端
pub mod jupiter;

// swap 编排
pub mod swap;

// 导出
pub use builder::{SignedTransaction, TransactionBuilder, UnsignedTransfer, FEE_RESERVE_LAMPORTS};
pub use jupiter::{JupiterClient, QuoteRequest, SwapAggregator};
pub use swap::{SwapOrchestrator, SwapOutcome};
