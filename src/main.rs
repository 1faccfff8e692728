use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use log::{error, info, warn};
use solana_sdk::signer::Signer;
use std::sync::Arc;
use std::time::Duration;

use sol_wallet_agent::agent::{DEFAULT_AIRDROP_SOL, DEFAULT_HISTORY_LIMIT};
use sol_wallet_agent::executor::JupiterClient;
use sol_wallet_agent::monitor::{
    BalanceTick, BalanceWatcher, PriceTick, PriceWatcher, WatchSchedule, DEFAULT_WATCH_DURATION_SECS,
};
use sol_wallet_agent::price::CoinGeckoClient;
use sol_wallet_agent::rpc::SolanaRpc;
use sol_wallet_agent::tokens::{lamports_to_sol, LAMPORTS_PER_SOL};
use sol_wallet_agent::{Config, KeyStore, Network, PriceCache, SwapOutcome, WalletAgent};

#[derive(Parser)]
#[command(name = "solagent")]
#[command(about = "Solana wallet agent: keys, transfers, swaps and prices")]
#[command(group(ArgGroup::new("cluster").args(["devnet", "testnet", "mainnet"])))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use devnet
    #[arg(long)]
    devnet: bool,

    /// Use testnet
    #[arg(long)]
    testnet: bool,

    /// Use mainnet-beta
    #[arg(long)]
    mainnet: bool,

    /// Custom RPC endpoint (any cluster)
    #[arg(long)]
    rpc: Option<String>,
}

impl Cli {
    fn cluster(&self) -> Option<Network> {
        if self.mainnet {
            Some(Network::Mainnet)
        } else if self.testnet {
            Some(Network::Testnet)
        } else if self.devnet {
            Some(Network::Devnet)
        } else {
            None
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new wallet (overwrites the stored one)
    New {
        #[arg(long, default_value = "agent")]
        label: String,
    },

    /// Import a base58 secret key
    Import { secret: String },

    /// Show the wallet address
    Address,

    /// SOL balance of the wallet or any address
    Balance { address: Option<String> },

    /// SPL token holdings
    Tokens,

    /// Request an airdrop (devnet/testnet)
    Airdrop {
        #[arg(default_value_t = DEFAULT_AIRDROP_SOL)]
        amount: f64,
    },

    /// Transfer SOL
    Send { to: String, amount: f64 },

    /// USD prices
    Price {
        #[arg(default_values_t = vec!["SOL".to_string()])]
        symbols: Vec<String>,
    },

    /// Swap quote (amount in base units of the input token)
    Quote {
        input: String,
        output: String,
        amount: u64,
        #[arg(long)]
        slippage_bps: Option<u16>,
    },

    /// Swap (executes on mainnet, preview elsewhere)
    Swap {
        input: String,
        output: String,
        amount: u64,
        #[arg(long)]
        slippage_bps: Option<u16>,
    },

    /// Poll balance or price
    Watch {
        #[command(subcommand)]
        target: WatchTarget,
    },

    /// Network, wallet, balance and RPC counters
    Status,

    /// Recent transactions
    History {
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WatchTarget {
    Balance {
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long, default_value_t = DEFAULT_WATCH_DURATION_SECS)]
        duration: u64,
    },
    Price {
        #[arg(default_value = "SOL")]
        symbol: String,
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long, default_value_t = DEFAULT_WATCH_DURATION_SECS)]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // 加载配置；启动阶段（配置、客户端初始化）出错直接以错误退出
    let config = Config::from_env()?;
    let policy = config.network_policy(cli.cluster(), cli.rpc.as_deref())?;
    config.print_summary(&policy);

    // 钱包
    let keystore = KeyStore::new(config.wallet_path());
    match keystore.load() {
        Ok(Some(_)) => {}
        Ok(None) => info!("📭 尚未创建钱包，使用 `solagent new` 或 `solagent import`"),
        Err(e) => warn!("⚠️  钱包加载失败: {}", e),
    }

    // 外部服务
    let rpc = Arc::new(SolanaRpc::new(
        policy.rpc_url().to_string(),
        config.get_commitment_config(),
    ));
    let aggregator = Arc::new(JupiterClient::new(
        config.jupiter_api_url.clone(),
        config.http_timeout(),
    )?);
    let price_source = Arc::new(CoinGeckoClient::new(
        config.coingecko_api_url.clone(),
        config.http_timeout(),
    )?);
    let prices = Arc::new(PriceCache::with_system_clock(price_source, config.price_ttl()));

    let agent = WalletAgent::new(keystore, rpc, aggregator, prices, policy)
        .with_confirmation(config.confirmation_policy());

    // 操作失败只记录日志，不以错误退出
    if let Err(e) = run(cli.command, &agent, &config).await {
        error!("❌ {}", e);
    }

    Ok(())
}

async fn run(command: Commands, agent: &WalletAgent, config: &Config) -> sol_wallet_agent::Result<()> {
    match command {
        Commands::New { label } => {
            let keypair = agent.keystore().generate(&label)?;
            info!("🔑 地址: {}", keypair.pubkey());
        }

        Commands::Import { secret } => {
            agent.keystore().import(&secret)?;
        }

        Commands::Address => {
            info!("🔑 {}", agent.address()?);
        }

        Commands::Balance { address } => {
            let lamports = agent.balance(address.as_deref()).await?;
            info!("💰 余额: {:.9} SOL ({} lamports)", lamports_to_sol(lamports), lamports);
        }

        Commands::Tokens => {
            let holdings = agent.token_accounts().await?;
            if holdings.is_empty() {
                info!("📭 没有 SPL token 持仓");
            }
            for h in holdings {
                info!("   {:<46} {:>18.6} (decimals {})", h.mint, h.ui_amount, h.decimals);
            }
        }

        Commands::Airdrop { amount } => {
            let signature = agent.airdrop(amount).await?;
            info!("🪂 空投已请求: {}", signature);
            info!("🔗 {}", agent.policy().explorer_tx_url(&signature.to_string()));
        }

        Commands::Send { to, amount } => {
            let receipt = agent.transfer_sol(&to, amount).await?;
            info!("✅ 签名: {}", receipt.signature);
            if let Some(confirmation) = receipt.confirmation {
                info!("   确认状态: {:?}", confirmation);
            }
        }

        Commands::Price { symbols } => {
            for symbol in &symbols {
                match agent.prices().get(symbol).await? {
                    Some(price) => info!("💱 {}: ${}", symbol.to_uppercase(), price),
                    None => warn!("⚠️  {}: 价格暂不可用", symbol.to_uppercase()),
                }
            }
        }

        Commands::Quote { input, output, amount, slippage_bps } => {
            let slippage = slippage_bps.unwrap_or(config.default_slippage_bps);
            let quote = agent.quote(&input, &output, amount, slippage).await?;
            info!("📊 {} {} → {} {}", quote.in_amount, input, quote.out_amount, output);
        }

        Commands::Swap { input, output, amount, slippage_bps } => {
            let slippage = slippage_bps.unwrap_or(config.default_slippage_bps);
            match agent.execute_swap(&input, &output, amount, slippage).await? {
                SwapOutcome::Preview(quote) => {
                    info!("👁️  预览: {} → {} (未执行)", quote.in_amount, quote.out_amount);
                }
                SwapOutcome::Submitted { signature, .. } => {
                    info!("🔗 {}", agent.policy().explorer_tx_url(&signature.to_string()));
                }
            }
        }

        Commands::Watch { target } => watch(target, agent, config).await?,

        Commands::Status => {
            let status = agent.status().await;
            info!("=== Agent Status ===");
            info!("  Network: {}", status.network);
            info!("  RPC: {}", status.rpc_url);
            info!("  Wallet: {}", status.wallet.as_deref().unwrap_or("(none)"));
            if let Some(balance) = status.balance_sol {
                info!("  Balance: {:.9} SOL", balance);
            }
            if let Some(price) = status.sol_price {
                info!("  SOL Price: ${}", price);
            }
            if let Some(value) = status.usd_value {
                info!("  Value: ${:.2}", value);
            }
            info!(
                "  RPC calls: {} | sent: {} | confirmed: {} | errors: {} | spent: {:.9} SOL",
                status.stats.calls,
                status.stats.sent,
                status.stats.confirmed,
                status.stats.errors,
                lamports_to_sol(status.stats.lamports_spent)
            );
        }

        Commands::History { limit } => {
            let records = agent.history(limit).await?;
            if records.is_empty() {
                info!("📭 没有交易记录");
            }
            for r in records {
                let when = r
                    .block_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let status = if r.failed { "❌" } else { "✅" };
                info!("  {} {} slot {} {}", status, when, r.slot, r.signature);
            }
        }
    }

    Ok(())
}

async fn watch(target: WatchTarget, agent: &WalletAgent, config: &Config) -> sol_wallet_agent::Result<()> {
    match target {
        WatchTarget::Balance { interval, duration } => {
            let address = agent.address()?;
            let schedule = WatchSchedule::new(
                Duration::from_secs(interval.unwrap_or(config.balance_watch_interval_secs)),
                Duration::from_secs(duration),
            )?;
            let watcher = BalanceWatcher::new(agent.gateway().clone());

            tokio::select! {
                result = watcher.run(&address, schedule, |tick| match tick {
                    BalanceTick::Observed(d) if d.change != 0 => info!(
                        "💰 {} {:.9} SOL ({:+.9})",
                        d.at.format("%H:%M:%S"),
                        lamports_to_sol(d.lamports),
                        d.change as f64 / LAMPORTS_PER_SOL as f64
                    ),
                    BalanceTick::Observed(d) => info!("💰 {} {:.9} SOL", d.at.format("%H:%M:%S"), lamports_to_sol(d.lamports)),
                    BalanceTick::Unavailable { at } => warn!("⚠️  {} 余额不可用", at.format("%H:%M:%S")),
                }) => { result?; }
                _ = tokio::signal::ctrl_c() => info!("🛑 监控已停止"),
            }
        }

        WatchTarget::Price { symbol, interval, duration } => {
            let schedule = WatchSchedule::new(
                Duration::from_secs(interval.unwrap_or(config.price_watch_interval_secs)),
                Duration::from_secs(duration),
            )?;
            let watcher = PriceWatcher::new(agent.prices().clone());
            let label = symbol.to_uppercase();

            tokio::select! {
                result = watcher.run(&symbol, schedule, |tick| match tick {
                    PriceTick::Observed(d) => match d.change_pct {
                        Some(pct) => info!("💱 {} {}: ${} ({:+.2}%)", d.at.format("%H:%M:%S"), label, d.price, pct),
                        None => info!("💱 {} {}: ${}", d.at.format("%H:%M:%S"), label, d.price),
                    },
                    PriceTick::Unavailable { at } => warn!("⚠️  {} {} 价格不可用", at.format("%H:%M:%S"), label),
                }) => { result?; }
                _ = tokio::signal::ctrl_c() => info!("🛑 监控已停止"),
            }
        }
    }
    Ok(())
}
