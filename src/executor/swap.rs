/// Swap 编排器
///
/// 两阶段:
/// 1. 报价（总是执行）
/// 2. 提交（仅当 NetworkPolicy 允许执行时）
///    - 向聚合器请求预构建交易
///    - 丢弃其中内嵌的 blockhash（可能已过期），换成新获取的 blockhash 后重新签名
///    - skip_preflight = true 发送（转账则走预检）

use log::{error, info, warn};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::rpc::RpcGateway;
use crate::types::{Quote, RecentHash};

use super::builder::SignedTransaction;
use super::jupiter::{QuoteRequest, SwapAggregator};

/// swap 以延迟换风险，跳过预检
const SWAP_SKIP_PREFLIGHT: bool = true;

#[derive(Debug, Clone)]
pub enum SwapOutcome {
    /// 当前网络不允许执行，只返回报价
    Preview(Quote),
    Submitted { quote: Quote, signature: Signature },
}

impl SwapOutcome {
    pub fn quote(&self) -> &Quote {
        match self {
            SwapOutcome::Preview(quote) => quote,
            SwapOutcome::Submitted { quote, .. } => quote,
        }
    }

    pub fn signature(&self) -> Option<Signature> {
        match self {
            SwapOutcome::Preview(_) => None,
            SwapOutcome::Submitted { signature, .. } => Some(*signature),
        }
    }
}

pub struct SwapOrchestrator {
    aggregator: Arc<dyn SwapAggregator>,
    gateway: Arc<RpcGateway>,
}

impl SwapOrchestrator {
    pub fn new(aggregator: Arc<dyn SwapAggregator>, gateway: Arc<RpcGateway>) -> Self {
        Self { aggregator, gateway }
    }

    pub async fn get_quote(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote> {
        let request = QuoteRequest { input_mint, output_mint, amount, slippage_bps };
        let quote = self.aggregator.quote(&request).await?;

        info!("📊 报价: {} → {}", quote.in_amount, quote.out_amount);
        info!("   价格冲击: {:.4}%", quote.price_impact_pct);
        Ok(quote)
    }

    /// 报价并在允许时执行
    pub async fn execute(&self, keypair: &Keypair, request: QuoteRequest) -> Result<SwapOutcome> {
        let quote = self
            .get_quote(request.input_mint, request.output_mint, request.amount, request.slippage_bps)
            .await?;

        let policy = self.gateway.policy();
        if !policy.permits_swap_execution() {
            warn!(
                "⚠️  {} 上仅预览报价，切换到 mainnet 才能执行 swap",
                policy.network()
            );
            return Ok(SwapOutcome::Preview(quote));
        }

        let tx_bytes = self
            .aggregator
            .swap_transaction(&quote, &keypair.pubkey())
            .await
            .map_err(|e| self.fail("获取 swap 交易", e))?;

        // blockhash 在拿到聚合器交易之后才获取
        let recent_hash = self.gateway.get_recent_hash().await?;
        let signed = resign(&tx_bytes, keypair, recent_hash).map_err(|e| self.fail("重新签名", e))?;

        let signature = self.gateway.send_transaction(&signed, SWAP_SKIP_PREFLIGHT).await?;
        info!("✅ swap 已提交: {}", signature);

        Ok(SwapOutcome::Submitted { quote, signature })
    }

    /// 网关之外的失败同样计入错误统计
    fn fail(&self, stage: &str, e: AgentError) -> AgentError {
        self.gateway.stats().record_error();
        error!("❌ swap {}失败: {}", stage, e);
        e
    }
}

/// 用新的 blockhash 重新签名聚合器返回的交易
pub fn resign(tx_bytes: &[u8], keypair: &Keypair, recent_hash: RecentHash) -> Result<SignedTransaction> {
    let prebuilt: VersionedTransaction = bincode::deserialize(tx_bytes)
        .map_err(|e| AgentError::Decode(format!("swap transaction: {}", e)))?;

    let mut message = prebuilt.message;
    message.set_recent_blockhash(recent_hash.hash);

    let transaction = VersionedTransaction::try_new(message, &[keypair])
        .map_err(|e| AgentError::Signing(e.to_string()))?;

    Ok(SignedTransaction::new(transaction, recent_hash, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Network, NetworkPolicy};
    use crate::testing::{hash_from_seq, FakeAggregator, FakeLedger};
    use crate::tokens::{resolve_mint, WRAPPED_SOL_MINT};
    use std::str::FromStr;

    fn setup(network: Network) -> (Arc<FakeLedger>, Arc<FakeAggregator>, Arc<RpcGateway>, SwapOrchestrator) {
        let ledger = Arc::new(FakeLedger::with_balance(5_000_000_000));
        let aggregator = Arc::new(FakeAggregator::new());
        let gateway = Arc::new(RpcGateway::new(
            ledger.clone(),
            NetworkPolicy::resolve(network, None, None),
        ));
        let orchestrator = SwapOrchestrator::new(aggregator.clone(), gateway.clone());
        (ledger, aggregator, gateway, orchestrator)
    }

    fn sol_to_usdc(network: Network) -> QuoteRequest {
        QuoteRequest {
            input_mint: Pubkey::from_str(WRAPPED_SOL_MINT).unwrap(),
            output_mint: resolve_mint("USDC", network).unwrap(),
            amount: 1_000_000,
            slippage_bps: 50,
        }
    }

    #[tokio::test]
    async fn test_quote_is_sane() {
        let (_, _, _, orchestrator) = setup(Network::Mainnet);
        let req = sol_to_usdc(Network::Mainnet);
        let quote = orchestrator
            .get_quote(req.input_mint, req.output_mint, req.amount, req.slippage_bps)
            .await
            .unwrap();
        assert!(quote.out_amount > 0);
        assert!((-100.0..=100.0).contains(&quote.price_impact_pct));
    }

    #[tokio::test]
    async fn test_quote_failure() {
        let (_, aggregator, _, orchestrator) = setup(Network::Mainnet);
        aggregator.fail_quotes();
        let kp = Keypair::new();

        let err = orchestrator.execute(&kp, sol_to_usdc(Network::Mainnet)).await.unwrap_err();
        assert!(matches!(err, AgentError::Quote(_)));
        assert_eq!(aggregator.swap_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_quote_stops_before_swap() {
        let (ledger, aggregator, _, orchestrator) = setup(Network::Mainnet);
        aggregator.set_quote_response(serde_json::json!({
            "inAmount": "1000000",
            "outAmount": "151234",
            "priceImpactPct": "garbage"
        }));
        let kp = Keypair::new();

        let err = orchestrator.execute(&kp, sol_to_usdc(Network::Mainnet)).await.unwrap_err();
        assert!(matches!(err, AgentError::Quote(_)));
        assert_eq!(aggregator.swap_calls(), 0);
        assert!(ledger.sent().is_empty());

        aggregator.set_quote_response(serde_json::json!({ "inAmount": "1000000", "outAmount": "0" }));
        let err = orchestrator.execute(&kp, sol_to_usdc(Network::Mainnet)).await.unwrap_err();
        assert!(matches!(err, AgentError::Quote(_)));
        assert_eq!(aggregator.swap_calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_closed_never_touches_swap_endpoint() {
        for network in [Network::Devnet, Network::Testnet] {
            let (ledger, aggregator, _, orchestrator) = setup(network);
            let kp = Keypair::new();

            let outcome = orchestrator.execute(&kp, sol_to_usdc(network)).await.unwrap();
            assert!(matches!(outcome, SwapOutcome::Preview(_)));
            assert!(outcome.signature().is_none());
            assert_eq!(aggregator.swap_calls(), 0);
            assert_eq!(ledger.total_calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_gate_open_resigns_with_fresh_hash() {
        let (ledger, aggregator, gateway, orchestrator) = setup(Network::Mainnet);
        let kp = Keypair::new();

        let outcome = orchestrator.execute(&kp, sol_to_usdc(Network::Mainnet)).await.unwrap();
        let signature = outcome.signature().unwrap();
        assert_eq!(aggregator.swap_calls(), 1);

        let sent = ledger.sent();
        assert_eq!(sent.len(), 1);
        let (tx, skip_preflight) = &sent[0];
        assert!(*skip_preflight);
        assert_eq!(tx.signatures[0], signature);
        assert_ne!(*tx.message.recent_blockhash(), aggregator.stale_hash());
        assert_eq!(*tx.message.recent_blockhash(), ledger.last_hash());
        assert!(tx.verify_with_results().iter().all(|ok| *ok));

        let stats = gateway.stats().snapshot();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.lamports_spent, 0);
    }

    #[test]
    fn test_resign_rejects_garbage() {
        let kp = Keypair::new();
        let recent = RecentHash { hash: hash_from_seq(3), last_valid_block_height: 1 };
        assert!(matches!(resign(&[1, 2, 3], &kp, recent), Err(AgentError::Decode(_))));
    }

    #[tokio::test]
    async fn test_resign_with_foreign_signer_fails() {
        let (_, aggregator, _, _) = setup(Network::Mainnet);
        let owner = Keypair::new();
        let intruder = Keypair::new();
        let quote = aggregator.quote(&sol_to_usdc(Network::Mainnet)).await.unwrap();
        let bytes = aggregator.swap_transaction(&quote, &owner.pubkey()).await.unwrap();
        let recent = RecentHash { hash: hash_from_seq(9), last_valid_block_height: 1 };

        assert!(matches!(resign(&bytes, &intruder, recent), Err(AgentError::Signing(_))));
        assert!(resign(&bytes, &owner, recent).is_ok());
    }
}
