/// 转账交易构建器
///
/// 状态流转: Built → Signed → Submitted
/// 不存在 Confirmed 状态，发送后即返回（见 RpcGateway）。

use log::{info, warn};
use solana_sdk::{
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::{Transaction, VersionedTransaction},
};
use solana_system_interface::instruction::transfer;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::rpc::RpcGateway;
use crate::tokens::lamports_to_sol;
use crate::types::RecentHash;

/// 为手续费预留的 lamports
pub const FEE_RESERVE_LAMPORTS: u64 = 5_000;

/// 转账走预检
const TRANSFER_SKIP_PREFLIGHT: bool = false;

/// 已构建、未签名的转账
#[derive(Debug, Clone)]
pub struct UnsignedTransfer {
    pub from: Pubkey,
    pub to: Pubkey,
    pub lamports: u64,
    message: Message,
}

impl UnsignedTransfer {
    pub fn message(&self) -> &Message {
        &self.message
    }
}

/// 已签名交易，签名后不可修改；换 blockhash 必须重新构建
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    transaction: VersionedTransaction,
    recent_hash: RecentHash,
    lamports: u64,
}

impl SignedTransaction {
    pub(crate) fn new(transaction: VersionedTransaction, recent_hash: RecentHash, lamports: u64) -> Self {
        Self { transaction, recent_hash, lamports }
    }

    pub fn signature(&self) -> Signature {
        self.transaction.signatures.first().copied().unwrap_or_default()
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    pub fn recent_hash(&self) -> &RecentHash {
        &self.recent_hash
    }

    /// 本交易转出的 lamports（swap 为 0）
    pub fn lamports(&self) -> u64 {
        self.lamports
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.transaction)
            .map_err(|e| AgentError::Signing(format!("serialize transaction: {}", e)))
    }
}

pub struct TransactionBuilder {
    gateway: Arc<RpcGateway>,
}

impl TransactionBuilder {
    pub fn new(gateway: Arc<RpcGateway>) -> Self {
        Self { gateway }
    }

    /// 构建转账
    ///
    /// 余额在构建时实时查询，要求 `lamports + FEE_RESERVE_LAMPORTS <= balance`。
    pub async fn build_transfer(&self, from: &Pubkey, to: &str, lamports: u64) -> Result<UnsignedTransfer> {
        let to_pubkey = Pubkey::from_str(to.trim())
            .map_err(|e| AgentError::InvalidAddress(format!("{}: {}", to, e)))?;

        let balance = self.gateway.get_balance(from).await?;
        let required = lamports.checked_add(FEE_RESERVE_LAMPORTS).unwrap_or(u64::MAX);
        if required > balance {
            warn!(
                "❌ 余额不足: 拥有 {:.6} SOL, 需要 {:.6} SOL + 手续费",
                lamports_to_sol(balance),
                lamports_to_sol(lamports)
            );
            return Err(AgentError::InsufficientFunds { required, available: balance });
        }

        let ix = transfer(from, &to_pubkey, lamports);
        let message = Message::new(&[ix], Some(from));

        Ok(UnsignedTransfer {
            from: *from,
            to: to_pubkey,
            lamports,
            message,
        })
    }

    /// 签名
    ///
    /// 纯函数：相同输入得到相同交易；不同 blockhash 得到不同交易。
    pub fn sign(unsigned: &UnsignedTransfer, keypair: &Keypair, recent_hash: RecentHash) -> Result<SignedTransaction> {
        let mut tx = Transaction::new_unsigned(unsigned.message.clone());
        tx.try_sign(&[keypair], recent_hash.hash)
            .map_err(|e| AgentError::Signing(e.to_string()))?;

        Ok(SignedTransaction::new(
            VersionedTransaction::from(tx),
            recent_hash,
            unsigned.lamports,
        ))
    }

    /// 提交；成功后累计转出金额
    pub async fn submit(&self, signed: &SignedTransaction) -> Result<Signature> {
        let signature = self
            .gateway
            .send_transaction(signed, TRANSFER_SKIP_PREFLIGHT)
            .await?;
        self.gateway.stats().record_spent(signed.lamports());
        Ok(signature)
    }

    /// build → 获取最新 blockhash → sign → submit
    pub async fn transfer(&self, keypair: &Keypair, to: &str, lamports: u64) -> Result<Signature> {
        let unsigned = self.build_transfer(&keypair.pubkey(), to, lamports).await?;

        info!(
            "💸 转账 {:.6} SOL -> {}",
            lamports_to_sol(lamports),
            unsigned.to
        );

        let recent_hash = self.gateway.get_recent_hash().await?;
        let signed = Self::sign(&unsigned, keypair, recent_hash)?;
        self.submit(&signed).await
    }
}
