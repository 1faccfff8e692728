use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;

use crate::error::{AgentError, Result};

/// 防重放用的最近 blockhash
///
/// 超过 `last_valid_block_height` 后网络会拒绝引用它的交易，
/// 因此每次提交前都要重新获取。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentHash {
    pub hash: Hash,
    pub last_valid_block_height: u64,
}

/// 聚合器报价
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    /// 带符号的百分比
    pub price_impact_pct: f64,
    /// 原始报价（含路由数据），请求 swap 交易时原样回传
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Quote {
    /// 解析聚合器响应
    ///
    /// 金额可能是字符串也可能是数字；输出为 0 或价格冲击越界都视为报价失败。
    pub fn from_response(raw: serde_json::Value) -> Result<Self> {
        let in_amount = json_u64(&raw, "inAmount")?;
        let out_amount = json_u64(&raw, "outAmount")?;
        let price_impact_pct = json_f64(&raw, "priceImpactPct")?.unwrap_or(0.0);

        if out_amount == 0 {
            return Err(AgentError::Quote("aggregator returned zero outAmount".into()));
        }
        if !price_impact_pct.is_finite() || !(-100.0..=100.0).contains(&price_impact_pct) {
            return Err(AgentError::Quote(format!(
                "priceImpactPct out of range: {}",
                price_impact_pct
            )));
        }

        Ok(Self { in_amount, out_amount, price_impact_pct, raw })
    }
}

fn json_u64(v: &serde_json::Value, field: &str) -> Result<u64> {
    match v.get(field) {
        Some(serde_json::Value::String(s)) => s
            .parse::<u64>()
            .map_err(|e| AgentError::Quote(format!("invalid {}: {}", field, e))),
        Some(n) if n.is_u64() => Ok(n.as_u64().unwrap_or_default()),
        _ => Err(AgentError::Quote(format!("missing {}", field))),
    }
}

/// 字段缺失或为 null 时返回 None；存在但无法解析时报错
fn json_f64(v: &serde_json::Value, field: &str) -> Result<Option<f64>> {
    let parsed = match v.get(field) {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(n) => n.as_f64(),
    };
    parsed
        .map(Some)
        .ok_or_else(|| AgentError::Quote(format!("invalid {}: {}", field, v[field])))
}

/// SPL token 持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub mint: String,
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: f64,
}

/// 地址的历史签名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signature: String,
    pub slot: u64,
    pub failed: bool,
    pub block_time: Option<DateTime<Utc>>,
}

/// 交易确认状态（仅在启用确认轮询时使用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Confirmation {
    /// 已被网络接受但尚未 finalized
    Pending,
    Finalized,
    Failed(String),
    TimedOut,
}
