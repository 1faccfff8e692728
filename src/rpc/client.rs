//! Ledger JSON-RPC 传输层
//!
//! `LedgerRpc` 是 RpcGateway 与网络之间的接缝；生产实现 `SolanaRpc`
//! 包装 solana-client 的 nonblocking `RpcClient`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::RpcRequest;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use solana_transaction_status::TransactionConfirmationStatus;

use crate::error::{AgentError, Result};
use crate::tokens::SPL_TOKEN_PROGRAM;
use crate::types::{Confirmation, RecentHash, SignatureRecord, TokenHolding};

/// Ledger RPC 传输接口
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    async fn get_latest_blockhash(&self) -> Result<RecentHash>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> Result<Signature>;

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature>;

    async fn get_token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>>;

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>>;

    async fn get_signature_status(&self, signature: &Signature) -> Result<Confirmation>;
}

/// solana-client 实现
pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(rpc_url: String, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url, commitment),
            commitment,
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let resp = self
            .client
            .get_balance_with_commitment(address, self.commitment)
            .await?;
        Ok(resp.value)
    }

    async fn get_latest_blockhash(&self) -> Result<RecentHash> {
        let (hash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;
        Ok(RecentHash { hash, last_valid_block_height })
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> Result<Signature> {
        let signature = self
            .client
            .send_transaction_with_config(
                transaction,
                RpcSendTransactionConfig {
                    skip_preflight,
                    preflight_commitment: Some(self.commitment.commitment),
                    ..Default::default()
                },
            )
            .await?;
        Ok(signature)
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        Ok(self.client.request_airdrop(address, lamports).await?)
    }

    async fn get_token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>> {
        let result: Value = self
            .client
            .send(
                RpcRequest::GetTokenAccountsByOwner,
                json!([
                    owner.to_string(),
                    { "programId": SPL_TOKEN_PROGRAM },
                    { "encoding": "jsonParsed" },
                ]),
            )
            .await?;
        parse_token_accounts(&result)
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>> {
        let result: Value = self
            .client
            .send(
                RpcRequest::GetSignaturesForAddress,
                json!([address.to_string(), { "limit": limit }]),
            )
            .await?;
        parse_signature_records(&result)
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<Confirmation> {
        let resp = self.client.get_signature_statuses(&[*signature]).await?;
        let status = match resp.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(Confirmation::Pending),
        };

        if let Some(err) = status.err {
            return Ok(Confirmation::Failed(err.to_string()));
        }

        debug!("签名 {} 状态: {:?}", signature, status.confirmation_status);
        match status.confirmation_status {
            Some(TransactionConfirmationStatus::Finalized) => Ok(Confirmation::Finalized),
            _ => Ok(Confirmation::Pending),
        }
    }
}

/// 解析 `getTokenAccountsByOwner` (jsonParsed) 的 result
pub fn parse_token_accounts(result: &Value) -> Result<Vec<TokenHolding>> {
    let items = result
        .get("value")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AgentError::Network("getTokenAccountsByOwner: missing value".into()))?;

    let mut holdings = Vec::with_capacity(items.len());
    for item in items {
        let info = match item.pointer("/account/data/parsed/info") {
            Some(info) => info,
            None => continue,
        };
        let token_amount = match info.get("tokenAmount") {
            Some(t) => t,
            None => continue,
        };

        holdings.push(TokenHolding {
            mint: info.get("mint").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            amount: token_amount
                .get("amount")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            decimals: token_amount.get("decimals").and_then(|v| v.as_u64()).unwrap_or(0) as u8,
            ui_amount: token_amount.get("uiAmount").and_then(|v| v.as_f64()).unwrap_or(0.0),
        });
    }

    Ok(holdings)
}

/// 解析 `getSignaturesForAddress` 的 result
pub fn parse_signature_records(result: &Value) -> Result<Vec<SignatureRecord>> {
    let items = result
        .as_array()
        .ok_or_else(|| AgentError::Network("getSignaturesForAddress: expected array".into()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let signature = item.get("signature")?.as_str()?.to_string();
            Some(SignatureRecord {
                signature,
                slot: item.get("slot").and_then(|v| v.as_u64()).unwrap_or(0),
                failed: item.get("err").map(|e| !e.is_null()).unwrap_or(false),
                block_time: item
                    .get("blockTime")
                    .and_then(|v| v.as_i64())
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_accounts() {
        let result = json!({
            "context": { "slot": 1 },
            "value": [
                {
                    "pubkey": "acct1",
                    "account": { "data": { "parsed": { "info": {
                        "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                        "tokenAmount": { "amount": "2500000", "decimals": 6, "uiAmount": 2.5 }
                    }}}}
                },
                {
                    "pubkey": "acct2",
                    "account": { "data": { "parsed": { "info": {
                        "mint": "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
                        "tokenAmount": { "amount": "0", "decimals": 5, "uiAmount": null }
                    }}}}
                },
                { "pubkey": "garbage", "account": {} }
            ]
        });

        let holdings = parse_token_accounts(&result).unwrap();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].amount, 2_500_000);
        assert_eq!(holdings[0].decimals, 6);
        assert!((holdings[0].ui_amount - 2.5).abs() < f64::EPSILON);
        assert_eq!(holdings[1].ui_amount, 0.0);
    }

    #[test]
    fn test_parse_token_accounts_missing_value() {
        assert!(parse_token_accounts(&json!({})).is_err());
    }

    #[test]
    fn test_parse_signature_records() {
        let result = json!([
            { "signature": "5abc", "slot": 10, "err": null, "blockTime": 1_700_000_000 },
            { "signature": "6def", "slot": 11, "err": { "InstructionError": [0, "Custom"] }, "blockTime": null },
            { "slot": 12 }
        ]);
        let records = parse_signature_records(&result).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].failed);
        assert!(records[0].block_time.is_some());
        assert!(records[1].failed);
        assert!(records[1].block_time.is_none());
    }
}
