/// RPC 网关
///
/// 所有链上读写都经过这里：
/// 1. 统计调用次数 / 错误次数 / 发送次数
/// 2. 按 NetworkPolicy 拦截不允许的操作（主网空投）
/// 3. 发送交易后立即返回，不等待 finality（可选的确认轮询见 `await_confirmation`）

use log::{debug, error, info, warn};
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{AgentError, Result};
use crate::executor::SignedTransaction;
use crate::network::NetworkPolicy;
use crate::types::{Confirmation, RecentHash, SignatureRecord, TokenHolding};

use super::client::LedgerRpc;

/// 进程级 RPC 计数器
#[derive(Debug, Default)]
pub struct RpcStats {
    calls: AtomicU64,
    sent: AtomicU64,
    confirmed: AtomicU64,
    errors: AtomicU64,
    lamports_spent: AtomicU64,
}

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RpcStatsSnapshot {
    pub calls: u64,
    pub sent: u64,
    pub confirmed: u64,
    pub errors: u64,
    pub lamports_spent: u64,
}

impl RpcStats {
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// 发送成功；`confirmed` 与 `sent` 同步递增，只表示节点已接受交易。
    /// 链上结果以 `await_confirmation` 为准，失败或超时不会回退这个计数
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spent(&self, lamports: u64) {
        self.lamports_spent.fetch_add(lamports, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RpcStatsSnapshot {
        RpcStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            lamports_spent: self.lamports_spent.load(Ordering::Relaxed),
        }
    }
}

/// 确认轮询参数
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ConfirmationPolicy {
    /// timeout 为 0 表示不轮询（fire-and-forget）
    pub fn from_secs(timeout_secs: u64, poll_interval_ms: u64) -> Option<Self> {
        if timeout_secs == 0 {
            return None;
        }
        Some(Self {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        })
    }
}

pub struct RpcGateway {
    rpc: Arc<dyn LedgerRpc>,
    policy: NetworkPolicy,
    stats: RpcStats,
}

impl RpcGateway {
    pub fn new(rpc: Arc<dyn LedgerRpc>, policy: NetworkPolicy) -> Self {
        info!("📡 RPC 网关已初始化");
        info!("   集群: {}", policy.network());
        info!("   RPC 端点: {}", policy.rpc_url());

        Self {
            rpc,
            policy,
            stats: RpcStats::default(),
        }
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &RpcStats {
        &self.stats
    }

    /// 统计一次调用，失败时记录错误
    async fn tracked<T, F>(&self, method: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.stats.record_call();
        let result = call.await;
        if let Err(e) = &result {
            self.stats.record_error();
            warn!("⚠️  RPC {} 失败: {}", method, e);
        }
        result
    }

    /// 查询余额（lamports）
    ///
    /// 失败返回 `Err`，调用方可以区分 "余额为 0" 与 "查询失败"。
    pub async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        self.tracked("getBalance", self.rpc.get_balance(address)).await
    }

    /// 查询失败时按 0 处理（显式降级）
    pub async fn balance_or_zero(&self, address: &Pubkey) -> u64 {
        match self.get_balance(address).await {
            Ok(lamports) => lamports,
            Err(e) => {
                debug!("余额查询降级为 0: {}", e);
                0
            }
        }
    }

    /// 获取最新 blockhash；每次构建交易前调用
    pub async fn get_recent_hash(&self) -> Result<RecentHash> {
        let recent = self
            .tracked("getLatestBlockhash", self.rpc.get_latest_blockhash())
            .await?;
        debug!(
            "🔗 最新 blockhash: {} (有效至区块高度 {})",
            recent.hash, recent.last_valid_block_height
        );
        Ok(recent)
    }

    /// 发送交易
    ///
    /// 网络接受后立即返回签名，不轮询确认状态。
    pub async fn send_transaction(
        &self,
        signed: &SignedTransaction,
        skip_preflight: bool,
    ) -> Result<Signature> {
        debug!(
            "📤 发送交易 {} (skip_preflight={})",
            signed.signature(),
            skip_preflight
        );

        let signature = self
            .tracked(
                "sendTransaction",
                self.rpc.send_transaction(signed.transaction(), skip_preflight),
            )
            .await?;

        self.stats.record_sent();
        info!("✅ 交易已发送: {}", signature);
        Ok(signature)
    }

    /// 请求空投（仅测试网）
    pub async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        if !self.policy.permits_airdrop() {
            error!("❌ 空投仅在测试网可用 (当前: {})", self.policy.network());
            return Err(AgentError::UnsupportedOperation(format!(
                "airdrop is not available on {}",
                self.policy.network()
            )));
        }

        info!("🪂 请求空投 {} lamports -> {}", lamports, address);
        self.tracked("requestAirdrop", self.rpc.request_airdrop(address, lamports))
            .await
    }

    pub async fn get_token_accounts(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>> {
        self.tracked(
            "getTokenAccountsByOwner",
            self.rpc.get_token_accounts_by_owner(owner),
        )
        .await
    }

    pub async fn get_recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>> {
        self.tracked(
            "getSignaturesForAddress",
            self.rpc.get_signatures_for_address(address, limit),
        )
        .await
    }

    pub async fn signature_status(&self, signature: &Signature) -> Result<Confirmation> {
        self.tracked("getSignatureStatuses", self.rpc.get_signature_status(signature))
            .await
    }

    /// 有界轮询交易确认
    ///
    /// 返回 Finalized / Failed / TimedOut；查询失败只记录，不中断轮询。
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        policy: ConfirmationPolicy,
    ) -> Confirmation {
        info!("⏳ 等待交易确认: {} (最多 {:?})", signature, policy.timeout);

        let start = Instant::now();
        while start.elapsed() < policy.timeout {
            match self.signature_status(signature).await {
                Ok(Confirmation::Pending) | Ok(Confirmation::TimedOut) => {
                    debug!("⏳ 交易尚未 finalized，继续等待...");
                }
                Ok(outcome) => {
                    info!("交易 {} 结果: {:?} (耗时 {:?})", signature, outcome, start.elapsed());
                    return outcome;
                }
                Err(e) => {
                    warn!("⚠️  查询交易状态失败: {}", e);
                }
            }
            tokio::time::sleep(policy.poll_interval).await;
        }

        warn!("⏰ 交易确认超时: {}", signature);
        Confirmation::TimedOut
    }
}
