//! Alpaca Scalping Bot
//!
//! Trades a list of symbols independently: buys a moving-average crossover
//! with a limit order, exits at cost plus a cent or better, and bails out
//! with a market order before the session closes.

mod api;
mod bot;
mod config;
mod models;
mod trading;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::bot::{Bot, BotConfig};
use crate::config::{load_selections, selections_from_args, AlpacaConfig, SymbolSelection};
use crate::trading::StrategyConfig;

/// Alpaca mean-reversion scalping bot CLI.
#[derive(Parser)]
#[command(name = "scalper")]
#[command(about = "Scalp moving-average crossovers on Alpaca", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start trading
    Run {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Show the market clock and what each symbol would recover to
    Status {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Show the strategy configuration
    Config,
}

/// Which symbols to trade.
#[derive(Args)]
struct SelectionArgs {
    /// Cash per entry for symbols given on the command line
    #[arg(long, default_value = "2000")]
    lot: Decimal,

    /// JSON file of { "symbol", "lot" } entries, used when no symbol is given
    #[arg(long, default_value = "stock-selections.json")]
    selections: PathBuf,

    /// Symbols to trade
    symbols: Vec<String>,
}

impl SelectionArgs {
    fn resolve(&self) -> Result<Vec<SymbolSelection>> {
        if self.symbols.is_empty() {
            load_selections(&self.selections)
        } else {
            selections_from_args(&self.symbols, self.lot)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { selection } => {
            let selections = selection.resolve()?;
            let alpaca = AlpacaConfig::from_env()?;

            info!(
                symbols = selections.len(),
                trading_url = %alpaca.trading_url,
                feed = %alpaca.feed,
                "Starting scalping bot"
            );

            println!("\n=== Alpaca Scalping Bot ===");
            println!("Endpoint: {}", alpaca.trading_url);
            for s in &selections {
                println!("  {:<8} lot ${}", s.symbol, s.lot);
            }
            println!("\nPress Ctrl+C to stop.\n");

            let bot = Bot::new(BotConfig::new(selections), alpaca)?;
            bot.run().await?;
        }

        Commands::Status { selection } => {
            let selections = selection.resolve()?;
            let alpaca = AlpacaConfig::from_env()?;
            let bot = Bot::new(BotConfig::new(selections), alpaca)?;

            let status = bot.status().await?;
            println!("\n{}", status);
        }

        Commands::Config => {
            let strategy = StrategyConfig::default();

            println!("\n=== Strategy Configuration ===\n");
            println!("Signal:");
            println!("  MA Window:            {} bars", strategy.ma_window);
            println!("  History Capacity:     {} bars", strategy.history_capacity);

            println!("\nSession ({}):", strategy.market_timezone);
            println!("  Session Open:         {}", strategy.session_open);
            println!("  Earliest Entry:       {}", strategy.earliest_entry);
            println!("  Closing Buffer:       {}s", strategy.closing_buffer_secs);

            println!("\nOrders:");
            println!("  Stale Buy Age:        {}s", strategy.stale_order_secs);
            println!("  Min Sell Markup:      ${}", strategy.min_sell_markup);
            println!("  Sweep Interval:       {}s", strategy.sweep_interval_secs);

            match AlpacaConfig::from_env() {
                Ok(alpaca) => {
                    println!("\n=== Endpoints ===\n");
                    println!("  Trading:              {}", alpaca.trading_url);
                    println!("  Market Data:          {}", alpaca.data_url);
                    println!("  Data Stream:          {}", alpaca.data_feed_stream_url());
                    println!("  Trade Stream:         {}", alpaca.trading_stream_url());
                }
                Err(e) => println!("\nCredentials not configured: {}", e),
            }
        }
    }

    Ok(())
}
