use anyhow::Context;
use clap::Parser;
use crossbot::api::{CoinbaseClient, ExchangeGateway, PaperExchange};
use crossbot::config::{load_credentials, Settings};
use crossbot::execution::{LoopSettings, TradingLoop};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// EMA-12 / EMA-26 crossover trader for Coinbase
#[derive(Parser, Debug)]
#[command(name = "crossbot", version, about)]
struct Cli {
    /// Config file (defaults to ./crossbot.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Product to trade, e.g. BTC-USD
    #[arg(long)]
    product: Option<String>,

    /// Trade in-memory balances against live candles instead of the real account
    #[arg(long)]
    paper: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.logfile.as_deref())?;

    tracing::info!("🚀 crossbot starting");

    let settings =
        Settings::load(cli.config.as_deref(), cli.product.clone(), cli.paper).map_err(fatal)?;
    log_configuration(&settings);

    let product = settings.product().map_err(fatal)?;
    let strategy = settings.strategy().map_err(fatal)?;
    let loop_settings = LoopSettings::from_settings(&settings).map_err(fatal)?;

    if settings.paper {
        // Candles are public, so credentials are optional here
        let client = CoinbaseClient::new(
            &settings.api_url,
            load_credentials().ok(),
            settings.request_timeout(),
            settings.requests_per_second,
        )
        .map_err(fatal)?;
        let gateway = PaperExchange::new(client, &product, settings.paper_quote_balance);
        run_until_shutdown(TradingLoop::new(gateway, strategy, loop_settings)).await;
    } else {
        let credentials = load_credentials().map_err(fatal)?;
        let client = CoinbaseClient::new(
            &settings.api_url,
            Some(credentials),
            settings.request_timeout(),
            settings.requests_per_second,
        )
        .map_err(fatal)?;
        run_until_shutdown(TradingLoop::new(client, strategy, loop_settings)).await;
    }

    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(logfile: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crossbot=info"));

    let file_layer = match logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Report a startup failure before the process exits
fn fatal<E: std::fmt::Display>(e: E) -> E {
    tracing::error!("❌ Fatal: {}", e);
    e
}

fn log_configuration(settings: &Settings) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Product: {}", settings.product_id);
    tracing::info!("  Granularity: {}s", settings.granularity_secs);
    tracing::info!(
        "  EMAs: {} / {} over {} candles",
        settings.short_period,
        settings.long_period,
        settings.lookback_candles
    );
    tracing::info!(
        "  Minimum order: {} quote / {} base",
        settings.min_quote_order,
        settings.min_base_order
    );
    if settings.paper {
        tracing::info!(
            "  Mode: PAPER (starting quote balance {})",
            settings.paper_quote_balance
        );
    } else {
        tracing::info!("  Mode: LIVE ({})", settings.api_url);
    }
}

async fn run_until_shutdown<G: ExchangeGateway>(mut trading_loop: TradingLoop<G>) {
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        _ = trading_loop.run() => {
            tracing::error!("Trading loop exited unexpectedly");
        }
    }

    tracing::info!("👋 crossbot stopped");
}
