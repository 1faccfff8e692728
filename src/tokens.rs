//! 已知代币表
//!
//! 符号 → mint 地址（按集群）以及符号 → 价格源 id。

use once_cell::sync::Lazy;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{AgentError, Result};
use crate::network::Network;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// 美元锚定的参考代币，价格恒为 1.0
pub const STABLE_SYMBOL: &str = "USDC";

#[derive(Debug, Clone, Copy)]
pub struct KnownToken {
    pub symbol: &'static str,
    pub mainnet_mint: &'static str,
    /// devnet 上的 mint（没有则与主网相同）
    pub devnet_mint: Option<&'static str>,
    pub decimals: u8,
}

impl KnownToken {
    pub fn mint_for(&self, network: Network) -> &'static str {
        match network {
            Network::Mainnet => self.mainnet_mint,
            _ => self.devnet_mint.unwrap_or(self.mainnet_mint),
        }
    }
}

pub const KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken { symbol: "SOL", mainnet_mint: WRAPPED_SOL_MINT, devnet_mint: None, decimals: 9 },
    KnownToken {
        symbol: "USDC",
        mainnet_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        devnet_mint: Some("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
        decimals: 6,
    },
    KnownToken { symbol: "USDT", mainnet_mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", devnet_mint: None, decimals: 6 },
    KnownToken { symbol: "BONK", mainnet_mint: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", devnet_mint: None, decimals: 5 },
    KnownToken { symbol: "JUP", mainnet_mint: "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", devnet_mint: None, decimals: 6 },
    KnownToken { symbol: "RAY", mainnet_mint: "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", devnet_mint: None, decimals: 6 },
    KnownToken { symbol: "PYTH", mainnet_mint: "HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3", devnet_mint: None, decimals: 6 },
    KnownToken { symbol: "WIF", mainnet_mint: "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm", devnet_mint: None, decimals: 6 },
    KnownToken { symbol: "ORCA", mainnet_mint: "orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE", devnet_mint: None, decimals: 6 },
];

/// 符号 → CoinGecko id
static PRICE_SOURCE_IDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("SOL", "solana"),
        ("BONK", "bonk"),
        ("WIF", "dogwifcoin"),
        ("JUP", "jupiter-exchange-solana"),
        ("RAY", "raydium"),
        ("PYTH", "pyth-network"),
        ("JTO", "jito-governance-token"),
        ("ORCA", "orca"),
        ("MNDE", "marinade"),
    ])
});

/// 查找价格源 id（符号需已大写）
pub fn price_source_id(symbol: &str) -> Option<&'static str> {
    PRICE_SOURCE_IDS.get(symbol).copied()
}

pub fn supported_price_symbols() -> Vec<&'static str> {
    let mut symbols: Vec<_> = PRICE_SOURCE_IDS.keys().copied().collect();
    symbols.sort_unstable();
    symbols
}

pub fn find_token(symbol: &str) -> Option<&'static KnownToken> {
    let upper = symbol.trim().to_uppercase();
    KNOWN_TOKENS.iter().find(|t| t.symbol == upper)
}

/// 解析符号或 mint 地址
pub fn resolve_mint(symbol_or_mint: &str, network: Network) -> Result<Pubkey> {
    if let Some(token) = find_token(symbol_or_mint) {
        return Pubkey::from_str(token.mint_for(network))
            .map_err(|e| AgentError::Decode(format!("{}: {}", token.symbol, e)));
    }

    Pubkey::from_str(symbol_or_mint.trim()).map_err(|_| {
        AgentError::UnknownToken(format!(
            "'{}' is neither a mint address nor one of: {}",
            symbol_or_mint,
            KNOWN_TOKENS.iter().map(|t| t.symbol).collect::<Vec<_>>().join(", ")
        ))
    })
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
