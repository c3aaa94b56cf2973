use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rsibot::config::{Credentials, Settings, TelegramTarget};
use rsibot::execution::{install_shutdown, Trader};
use rsibot::{BybitClient, PositionState, TelegramNotifier};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rsibot", version, about = "RSI threshold trading bot for Bybit spot")]
struct Cli {
    /// Optional config file (any format the `config` crate reads, e.g. rsibot.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Poll and trade until Ctrl+C (default)
    Run,
    /// Run a single decision tick and exit
    Once,
    /// Force one buy and one sell to check credentials and order placement
    SmokeTest,
    /// Print price, RSI and balances without trading
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    tracing::info!("🚀 RSI bot starting");
    log_configuration(&settings);

    let credentials = Credentials::from_env()?;
    let exchange = BybitClient::new(settings.exchange.clone(), credentials)
        .context("Failed to build Bybit client")?;
    let notifier = TelegramNotifier::new(&settings.telegram, TelegramTarget::from_env())
        .context("Failed to build Telegram client")?;

    let trader = Trader::new(exchange, notifier, &settings);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("Press Ctrl+C to stop...");
            let shutdown = install_shutdown(tokio::signal::ctrl_c()).await;
            let state = trader.run(PositionState::NoPosition, shutdown).await;
            tracing::info!(position = ?state, "👋 RSI bot stopped");
        }
        Command::Once => {
            let (state, outcome) = trader.tick(PositionState::NoPosition).await;
            tracing::info!(position = ?state, ?outcome, "Single tick complete");
        }
        Command::SmokeTest => {
            let state = trader.smoke_test().await;
            tracing::info!(position = ?state, "Smoke test complete");
        }
        Command::Status => {
            let report = trader.status().await.context("Failed to fetch status")?;
            let rsi = report
                .rsi
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "n/a".to_string());
            println!("Symbol:  {}", settings.exchange.symbol);
            println!("Price:   {:.4}", report.price);
            println!("RSI:     {}", rsi);
            println!(
                "Balance: {:.4} {} / {:.4} {}",
                report.base_balance,
                settings.exchange.base_coin,
                report.quote_balance,
                settings.exchange.quote_coin
            );
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rsibot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_configuration(settings: &Settings) {
    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {}", settings.exchange.symbol);
    tracing::info!(
        "  Stake: {} {}",
        settings.strategy.stake_amount,
        settings.exchange.quote_coin
    );
    tracing::info!(
        "  RSI: buy < {}, sell > {}",
        settings.strategy.buy_below,
        settings.strategy.sell_above
    );
    tracing::info!(
        "  Candles: {} x {}m",
        settings.exchange.kline_limit,
        settings.exchange.kline_interval_minutes
    );
    tracing::info!("  Poll interval: {}s", settings.poll_interval_secs);
}
