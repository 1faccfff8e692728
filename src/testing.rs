//! 单元测试用的内存替身

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use solana_sdk::{
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_system_interface::instruction::transfer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{AgentError, Result};
use crate::executor::jupiter::{QuoteRequest, SwapAggregator};
use crate::price::{Clock, PriceSource};
use crate::rpc::LedgerRpc;
use crate::types::{Confirmation, Quote, RecentHash, SignatureRecord, TokenHolding};

pub fn hash_from_seq(seq: u64) -> Hash {
    let mut bytes = [0xABu8; 32];
    bytes[..8].copy_from_slice(&seq.to_le_bytes());
    Hash::new_from_array(bytes)
}

/// 内存账本
pub struct FakeLedger {
    balance: Mutex<u64>,
    fail_balance: AtomicBool,
    fail_send: AtomicBool,
    hash_seq: AtomicU64,
    calls: AtomicU64,
    sent: Mutex<Vec<(VersionedTransaction, bool)>>,
    airdrops: Mutex<Vec<(Pubkey, u64)>>,
    status: Mutex<Confirmation>,
    holdings: Mutex<Vec<TokenHolding>>,
    records: Mutex<Vec<SignatureRecord>>,
}

impl FakeLedger {
    pub fn with_balance(lamports: u64) -> Self {
        Self {
            balance: Mutex::new(lamports),
            fail_balance: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            hash_seq: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            airdrops: Mutex::new(Vec::new()),
            status: Mutex::new(Confirmation::Pending),
            holdings: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn set_balance(&self, lamports: u64) {
        *self.balance.lock() = lamports;
    }

    pub fn fail_balance(&self, fail: bool) {
        self.fail_balance.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: Confirmation) {
        *self.status.lock() = status;
    }

    pub fn set_holdings(&self, holdings: Vec<TokenHolding>) {
        *self.holdings.lock() = holdings;
    }

    pub fn set_records(&self, records: Vec<SignatureRecord>) {
        *self.records.lock() = records;
    }

    /// 最近一次发放的 blockhash
    pub fn last_hash(&self) -> Hash {
        hash_from_seq(self.hash_seq.load(Ordering::SeqCst))
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(VersionedTransaction, bool)> {
        self.sent.lock().clone()
    }

    pub fn airdrops(&self) -> Vec<(Pubkey, u64)> {
        self.airdrops.lock().clone()
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
        self.hit();
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(AgentError::Network("connection refused".into()));
        }
        Ok(*self.balance.lock())
    }

    async fn get_latest_blockhash(&self) -> Result<RecentHash> {
        self.hit();
        let seq = self.hash_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RecentHash {
            hash: hash_from_seq(seq),
            last_valid_block_height: 1_000 + seq,
        })
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> Result<Signature> {
        self.hit();
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(AgentError::Network("Blockhash not found".into()));
        }
        self.sent.lock().push((transaction.clone(), skip_preflight));
        Ok(transaction.signatures[0])
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        self.hit();
        self.airdrops.lock().push((*address, lamports));
        Ok(Signature::default())
    }

    async fn get_token_accounts_by_owner(&self, _owner: &Pubkey) -> Result<Vec<TokenHolding>> {
        self.hit();
        Ok(self.holdings.lock().clone())
    }

    async fn get_signatures_for_address(
        &self,
        _address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>> {
        self.hit();
        Ok(self.records.lock().iter().take(limit).cloned().collect())
    }

    async fn get_signature_status(&self, _signature: &Signature) -> Result<Confirmation> {
        self.hit();
        Ok(self.status.lock().clone())
    }
}

/// 聚合器替身
pub struct FakeAggregator {
    quote_response: Mutex<Value>,
    quote_status_ok: AtomicBool,
    stale_hash: Hash,
    pub quote_calls: AtomicU64,
    pub swap_calls: AtomicU64,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self {
            quote_response: Mutex::new(json!({
                "inputMint": "So11111111111111111111111111111111111111112",
                "inAmount": "1000000",
                "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "outAmount": "151234",
                "priceImpactPct": "0.0003",
                "routePlan": [{ "swapInfo": { "label": "Whirlpool" }, "percent": 100 }]
            })),
            quote_status_ok: AtomicBool::new(true),
            stale_hash: hash_from_seq(u64::MAX),
            quote_calls: AtomicU64::new(0),
            swap_calls: AtomicU64::new(0),
        }
    }

    pub fn set_quote_response(&self, response: Value) {
        *self.quote_response.lock() = response;
    }

    /// 模拟 HTTP 非 2xx
    pub fn fail_quotes(&self) {
        self.quote_status_ok.store(false, Ordering::SeqCst);
    }

    pub fn stale_hash(&self) -> Hash {
        self.stale_hash
    }

    pub fn swap_calls(&self) -> u64 {
        self.swap_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapAggregator for FakeAggregator {
    async fn quote(&self, _request: &QuoteRequest) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if !self.quote_status_ok.load(Ordering::SeqCst) {
            return Err(AgentError::Quote("HTTP 400: Could not find any route".into()));
        }
        Quote::from_response(self.quote_response.lock().clone())
    }

    async fn swap_transaction(&self, _quote: &Quote, user: &Pubkey) -> Result<Vec<u8>> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);

        // 聚合器预构建的交易，内嵌的 blockhash 可能已过期
        let ix = transfer(user, user, 1);
        let mut message = Message::new(&[ix], Some(user));
        message.recent_blockhash = self.stale_hash;
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); 1],
            message: VersionedMessage::Legacy(message),
        };
        bincode::serialize(&tx).map_err(|e| AgentError::Network(e.to_string()))
    }
}

/// 价格源替身；`price = None` 表示请求失败
pub struct FakePriceSource {
    price: Mutex<Option<f64>>,
    rate_limited: AtomicBool,
    fetches: AtomicU64,
}

impl FakePriceSource {
    pub fn new(price: f64) -> Self {
        Self {
            price: Mutex::new(Some(price)),
            rate_limited: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn set_price(&self, price: Option<f64>) {
        *self.price.lock() = price;
    }

    pub fn set_rate_limited(&self, limited: bool) {
        self.rate_limited.store(limited, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn fetch_usd(&self, _source_id: &str) -> Result<f64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(AgentError::RateLimited("HTTP 429".into()));
        }
        (*self.price.lock()).ok_or_else(|| AgentError::Network("timeout".into()))
    }
}

/// 手动推进的时钟
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Utc::now()) }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
