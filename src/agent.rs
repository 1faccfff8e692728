//! 钱包代理
//!
//! 把 KeyStore / RpcGateway / TransactionBuilder / SwapOrchestrator / PriceCache
//! 组装在一起，供 CLI 使用。所有需要钱包的操作在未加载钱包时返回 `Config` 错误。

use log::{info, warn};
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature, signer::Signer};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::executor::{QuoteRequest, SwapAggregator, SwapOrchestrator, SwapOutcome, TransactionBuilder};
use crate::keystore::KeyStore;
use crate::network::{Network, NetworkPolicy};
use crate::price::PriceCache;
use crate::rpc::{ConfirmationPolicy, LedgerRpc, RpcGateway, RpcStatsSnapshot};
use crate::tokens::{lamports_to_sol, resolve_mint, sol_to_lamports};
use crate::types::{Confirmation, Quote, SignatureRecord, TokenHolding};

pub const DEFAULT_HISTORY_LIMIT: usize = 5;
pub const DEFAULT_AIRDROP_SOL: f64 = 1.0;

/// 代理状态快照
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub network: Network,
    pub rpc_url: String,
    pub wallet: Option<String>,
    /// 余额查询失败或未加载钱包时为 None
    pub balance_sol: Option<f64>,
    pub sol_price: Option<f64>,
    pub usd_value: Option<f64>,
    pub stats: RpcStatsSnapshot,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub signature: Signature,
    pub explorer_url: String,
    /// 仅在配置了确认轮询时存在
    pub confirmation: Option<Confirmation>,
}

pub struct WalletAgent {
    keystore: KeyStore,
    gateway: Arc<RpcGateway>,
    builder: TransactionBuilder,
    swaps: SwapOrchestrator,
    prices: Arc<PriceCache>,
    confirmation: Option<ConfirmationPolicy>,
}

impl WalletAgent {
    pub fn new(
        keystore: KeyStore,
        rpc: Arc<dyn LedgerRpc>,
        aggregator: Arc<dyn SwapAggregator>,
        prices: Arc<PriceCache>,
        policy: NetworkPolicy,
    ) -> Self {
        let gateway = Arc::new(RpcGateway::new(rpc, policy));
        Self {
            keystore,
            builder: TransactionBuilder::new(gateway.clone()),
            swaps: SwapOrchestrator::new(aggregator, gateway.clone()),
            gateway,
            prices,
            confirmation: None,
        }
    }

    /// 发送后有界轮询确认
    pub fn with_confirmation(mut self, confirmation: Option<ConfirmationPolicy>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    pub fn gateway(&self) -> &Arc<RpcGateway> {
        &self.gateway
    }

    pub fn prices(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    pub fn policy(&self) -> &NetworkPolicy {
        self.gateway.policy()
    }

    pub fn address(&self) -> Result<Pubkey> {
        Ok(self.keystore.require()?.pubkey())
    }

    /// 余额；`address` 为空时查询自己的钱包
    pub async fn balance(&self, address: Option<&str>) -> Result<u64> {
        let target = match address {
            Some(addr) => addr
                .trim()
                .parse::<Pubkey>()
                .map_err(|e| AgentError::InvalidAddress(format!("{}: {}", addr, e)))?,
            None => self.address()?,
        };
        self.gateway.get_balance(&target).await
    }

    pub async fn status(&self) -> AgentStatus {
        let policy = self.policy();
        let wallet = self.keystore.current().map(|kp| kp.pubkey());

        let balance_sol = match wallet {
            Some(pubkey) => match self.gateway.get_balance(&pubkey).await {
                Ok(lamports) => Some(lamports_to_sol(lamports)),
                Err(e) => {
                    warn!("⚠️  状态查询余额失败: {}", e);
                    None
                }
            },
            None => None,
        };

        let sol_price = match self.prices.get("SOL").await {
            Ok(price) => price,
            Err(e) => {
                warn!("⚠️  {}", e);
                None
            }
        };

        let usd_value = balance_sol.zip(sol_price).map(|(sol, price)| sol * price);

        AgentStatus {
            network: policy.network(),
            rpc_url: policy.rpc_url().to_string(),
            wallet: wallet.map(|p| p.to_string()),
            balance_sol,
            sol_price,
            usd_value,
            stats: self.gateway.stats().snapshot(),
        }
    }

    /// 转账 SOL
    pub async fn transfer_sol(&self, to: &str, sol: f64) -> Result<TransferReceipt> {
        let keypair = self.keystore.require()?;
        let lamports = positive_lamports(sol)?;

        let signature = self.builder.transfer(&keypair, to, lamports).await?;
        let explorer_url = self.policy().explorer_tx_url(&signature.to_string());
        info!("🔗 {}", explorer_url);

        let confirmation = match self.confirmation {
            Some(policy) => Some(self.gateway.await_confirmation(&signature, policy).await),
            None => None,
        };
        // stats 里的 confirmed 只记录“已发送”，链上失败要单独提示
        match &confirmation {
            Some(Confirmation::Failed(reason)) => warn!("⚠️  交易已发送但链上执行失败: {} ({})", signature, reason),
            Some(Confirmation::TimedOut) => warn!("⚠️  交易已发送但未在时限内确认: {}", signature),
            _ => {}
        }

        Ok(TransferReceipt { signature, explorer_url, confirmation })
    }

    /// 请求空投；主网上直接拒绝
    pub async fn airdrop(&self, sol: f64) -> Result<Signature> {
        let address = self.address()?;
        let lamports = positive_lamports(sol)?;
        self.gateway.request_airdrop(&address, lamports).await
    }

    /// 报价；`amount` 为输入 token 的最小单位
    pub async fn quote(&self, input: &str, output: &str, amount: u64, slippage_bps: u16) -> Result<Quote> {
        let request = self.quote_request(input, output, amount, slippage_bps)?;
        self.swaps
            .get_quote(request.input_mint, request.output_mint, request.amount, request.slippage_bps)
            .await
    }

    /// 报价，并在主网上执行
    pub async fn execute_swap(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<SwapOutcome> {
        let keypair = self.keystore.require()?;
        let request = self.quote_request(input, output, amount, slippage_bps)?;
        self.swaps.execute(&keypair, request).await
    }

    pub async fn token_accounts(&self) -> Result<Vec<TokenHolding>> {
        let owner = self.address()?;
        self.gateway.get_token_accounts(&owner).await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<SignatureRecord>> {
        let address = self.address()?;
        self.gateway.get_recent_signatures(&address, limit).await
    }

    fn quote_request(&self, input: &str, output: &str, amount: u64, slippage_bps: u16) -> Result<QuoteRequest> {
        if amount == 0 {
            return Err(AgentError::InvalidAmount("swap amount must be > 0".into()));
        }
        let network = self.policy().network();
        Ok(QuoteRequest {
            input_mint: resolve_mint(input, network)?,
            output_mint: resolve_mint(output, network)?,
            amount,
            slippage_bps,
        })
    }
}

fn positive_lamports(sol: f64) -> Result<u64> {
    match sol_to_lamports(sol) {
        0 => Err(AgentError::InvalidAmount(format!("{} SOL", sol))),
        lamports => Ok(lamports),
    }
}
