/// 余额 / 价格监控
///
/// 单一协作式循环:
/// 1. 每个 tick 读取一次（余额走 RpcGateway，价格走 PriceCache）
/// 2. 与上一次观测比较，生成变化量
/// 3. 交给 sink 处理（CLI 中打印日志）
///
/// 状态只存在于循环的局部变量中，在两个 tick 之间取消（drop future）不会留下半更新的状态。

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::{AgentError, Result};
use crate::price::PriceCache;
use crate::rpc::RpcGateway;
use crate::tokens::lamports_to_sol;

pub const DEFAULT_BALANCE_WATCH_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PRICE_WATCH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WATCH_DURATION_SECS: u64 = 60;

/// 监控节奏：间隔 + tick 次数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSchedule {
    pub interval: Duration,
    pub ticks: u64,
}

impl WatchSchedule {
    /// 在 `duration` 内每 `interval` 读一次，第一次立即执行
    pub fn new(interval: Duration, duration: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(AgentError::Config("watch interval must be > 0".into()));
        }
        let ticks = duration.as_nanos().div_ceil(interval.as_nanos()).max(1);
        Ok(Self {
            interval,
            ticks: u64::try_from(ticks).unwrap_or(u64::MAX),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub at: DateTime<Utc>,
    pub lamports: u64,
    /// 与上次成功观测相比的变化；首次观测为 0
    pub change: i128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceTick {
    Observed(BalanceDelta),
    Unavailable { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDelta {
    pub at: DateTime<Utc>,
    pub price: f64,
    /// 百分比变化；首次观测或上次价格为 0 时为 None
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceTick {
    Observed(PriceDelta),
    Unavailable { at: DateTime<Utc> },
}

pub fn balance_change(previous: Option<u64>, current: u64) -> i128 {
    previous.map_or(0, |prev| current as i128 - prev as i128)
}

pub fn price_change_pct(previous: Option<f64>, current: f64) -> Option<f64> {
    match previous {
        Some(prev) if prev > 0.0 => Some((current - prev) / prev * 100.0),
        _ => None,
    }
}

pub struct BalanceWatcher {
    gateway: Arc<RpcGateway>,
}

impl BalanceWatcher {
    pub fn new(gateway: Arc<RpcGateway>) -> Self {
        Self { gateway }
    }

    /// 返回实际执行的 tick 数
    pub async fn run<F>(&self, address: &Pubkey, schedule: WatchSchedule, mut sink: F) -> Result<u64>
    where
        F: FnMut(BalanceTick),
    {
        info!(
            "👀 监控余额 {} (每 {:?}, 共 {} 次)",
            address, schedule.interval, schedule.ticks
        );

        let mut ticker = interval(schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut previous: Option<u64> = None;
        for _ in 0..schedule.ticks {
            ticker.tick().await;
            let at = Utc::now();

            match self.gateway.get_balance(address).await {
                Ok(lamports) => {
                    let change = balance_change(previous, lamports);
                    if change != 0 {
                        debug!("💰 余额变化: {:+} lamports", change);
                    }
                    previous = Some(lamports);
                    sink(BalanceTick::Observed(BalanceDelta { at, lamports, change }));
                }
                Err(e) => {
                    warn!("⚠️  余额读取失败: {}", e);
                    sink(BalanceTick::Unavailable { at });
                }
            }
        }

        if let Some(lamports) = previous {
            info!("👀 余额监控结束，最后余额 {:.9} SOL", lamports_to_sol(lamports));
        }
        Ok(schedule.ticks)
    }
}

pub struct PriceWatcher {
    prices: Arc<PriceCache>,
}

impl PriceWatcher {
    pub fn new(prices: Arc<PriceCache>) -> Self {
        Self { prices }
    }

    /// 未知符号在第一个 tick 直接返回错误
    pub async fn run<F>(&self, symbol: &str, schedule: WatchSchedule, mut sink: F) -> Result<u64>
    where
        F: FnMut(PriceTick),
    {
        let symbol = symbol.trim().to_uppercase();
        info!(
            "👀 监控 {} 价格 (每 {:?}, 共 {} 次)",
            symbol, schedule.interval, schedule.ticks
        );

        let mut ticker = interval(schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut previous: Option<f64> = None;
        for _ in 0..schedule.ticks {
            ticker.tick().await;
            let at = Utc::now();

            match self.prices.get(&symbol).await? {
                Some(price) => {
                    let change_pct = price_change_pct(previous, price);
                    previous = Some(price);
                    sink(PriceTick::Observed(PriceDelta { at, price, change_pct }));
                }
                None => sink(PriceTick::Unavailable { at }),
            }
        }

        Ok(schedule.ticks)
    }
}
