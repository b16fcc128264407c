//! ScanLab CLI: cache daemon plus one-shot scan and model commands.
//!
//! Commands:
//! - `serve`: restore the snapshot, refresh everything, then refresh periodically until Ctrl-C
//! - `fetch`, `data`, `analyze`: one symbol, fetched on demand when not cached
//! - `advanced`: advanced indicators and the decision signal for a cached range
//! - `scan`: rank every cached symbol for a range, optionally with the ML overlay
//! - `warm-up`: fetch the configured watch-list
//! - `train`, `model-info`, `predict`, `label`: the ML overlay
//! - `correlate`: close-price correlation across cached symbols
//! - `cache status`: per-symbol cache state
//!
//! Every command prints pretty JSON on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scanlab_core::analysis::SignalSet;
use scanlab_runner::{Reply, ScanConfig, ScanService};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scanlab",
    about = "ScanLab: cached bar acquisition, signal scoring and trade scanning"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresh daemon until interrupted.
    Serve {
        /// Also fetch the configured watch-list at startup.
        #[arg(long, default_value_t = false)]
        warm_up: bool,
    },
    /// Fetch one symbol now and store it in the cache snapshot.
    Fetch {
        symbol: String,
        /// Exchange. Defaults to the configured default exchange.
        #[arg(long)]
        exchange: Option<String>,
    },
    /// Print cached rows for one range.
    Data {
        symbol: String,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, default_value = "1d")]
        range: String,
    },
    /// Print the indicator bundle for one range.
    Analyze {
        symbol: String,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, default_value = "1d")]
        range: String,
        /// Comma-separated signals to keep: rsi, macd, fib, patterns, all.
        #[arg(long, default_value = "all")]
        signals: String,
        /// Re-run the analyzer on cached rows instead of using the cached bundle.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Advanced indicators and the rule-based decision signal for one range.
    Advanced {
        symbol: String,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, default_value = "1d")]
        range: String,
    },
    /// Rank every cached symbol by score.
    Scan {
        #[arg(long, default_value = "1d")]
        range: String,
        #[arg(long, default_value = "all")]
        signals: String,
        /// Blend in the ML overlay and rank by the combined score.
        #[arg(long, default_value_t = false)]
        ml: bool,
    },
    /// Fetch every watch-list symbol not yet cached.
    WarmUp,
    /// Train the ML overlay on the cached data and recorded labels.
    Train,
    /// Print the ML overlay's state and metrics.
    ModelInfo,
    /// ML prediction for a symbol's bundle.
    Predict {
        symbol: String,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, default_value = "1d")]
        range: String,
    },
    /// Record a trade outcome for future training.
    Label {
        symbol: String,
        /// Trade date (YYYY-MM-DD).
        #[arg(long)]
        date: String,
        /// Outcome: positive is a good trade.
        #[arg(long, allow_hyphen_values = true)]
        outcome: f64,
    },
    /// Correlation matrix of closes across cached symbols.
    Correlate {
        #[arg(required = true)]
        symbols: Vec<String>,
        #[arg(long, default_value = "1d")]
        range: String,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report per-symbol status, ranges and timestamps.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ScanConfig::load(cli.config.as_deref())?;
    let svc = ScanService::from_config(&config);
    let exchange = |e: Option<String>| e.unwrap_or_else(|| config.default_exchange.clone());

    if !matches!(cli.command, Commands::Serve { .. }) {
        restore(&svc).await;
    }
    match cli.command {
        Commands::Serve { warm_up } => return run_serve(&svc, &config, warm_up).await,
        Commands::Fetch { symbol, exchange: e } => {
            let exchange = exchange(e);
            let fetched = svc.orchestrator().refresh(&symbol, &exchange).await;
            svc.orchestrator().persist().await;
            fetched.with_context(|| format!("fetch failed for {symbol}"))?;
            print_json(&svc.cache_status().await)?;
        }
        Commands::Data {
            symbol,
            exchange: e,
            range,
        } => {
            let exchange = exchange(e);
            ensure_cached(&svc, &symbol, &exchange).await;
            print_reply(&svc.data(&symbol, &exchange, &range).await?)?;
        }
        Commands::Analyze {
            symbol,
            exchange: e,
            range,
            signals,
            fresh,
        } => {
            let exchange = exchange(e);
            let signals = parse_signals(&signals)?;
            let reply = if fresh {
                ensure_cached(&svc, &symbol, &exchange).await;
                svc.analyze(&symbol, &exchange, &range).await?
            } else {
                svc.analyze_cached(&symbol, &exchange, &range, signals).await?
            };
            print_reply(&reply)?;
        }
        Commands::Advanced {
            symbol,
            exchange: e,
            range,
        } => {
            let exchange = exchange(e);
            ensure_cached(&svc, &symbol, &exchange).await;
            print_json(&svc.advanced_analysis(&symbol, &exchange, &range).await?)?;
        }
        Commands::Scan { range, signals, ml } => {
            let signals = parse_signals(&signals)?;
            if ml {
                print_json(&svc.scan_with_ml(&range, signals).await)?;
            } else {
                print_json(&svc.scan(&range, signals).await)?;
            }
        }
        Commands::WarmUp => {
            let handles = svc
                .orchestrator()
                .warm_up(&config.watchlist, &config.default_exchange)
                .await;
            for h in handles {
                let _ = h.await;
            }
            print_json(&svc.cache_status().await)?;
        }
        Commands::Train => print_json(&svc.train().await?)?,
        Commands::ModelInfo => print_json(&svc.model_info().await)?,
        Commands::Predict {
            symbol,
            exchange: e,
            range,
        } => {
            let exchange = exchange(e);
            ensure_cached(&svc, &symbol, &exchange).await;
            print_reply(&svc.predict(&symbol, &exchange, &range).await?)?;
        }
        Commands::Label {
            symbol,
            date,
            outcome,
        } => print_json(&svc.label(&symbol, &date, outcome).await?)?,
        Commands::Correlate { symbols, range } => {
            print_json(&svc.correlation(&symbols, &range).await?)?
        }
        Commands::Cache {
            action: CacheAction::Status,
        } => print_json(&svc.cache_status().await)?,
    }

    svc.orchestrator().persist().await;
    Ok(())
}

async fn run_serve(svc: &ScanService, config: &ScanConfig, warm_up: bool) -> Result<()> {
    let orch = svc.orchestrator();
    let scheduled = orch.startup().await.len();
    tracing::info!(
        scheduled,
        cache_dir = %config.cache_dir.display(),
        "scanlab serving"
    );
    if warm_up {
        let resp = svc.warm_up().await;
        tracing::info!(symbols = resp.symbols, scheduled = resp.scheduled, "warm-up started");
    }

    let refresh_loop = orch.spawn_refresh_loop(config.refresh_interval());
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    refresh_loop.abort();
    orch.try_persist().await?;
    Ok(())
}

/// Merge the on-disk snapshot before a one-shot command.
async fn restore(svc: &ScanService) {
    let orch = svc.orchestrator();
    if let Err(e) = orch.store().load_from_disk(orch.snapshot_path()).await {
        tracing::warn!(error = %e, "cache snapshot unreadable; starting empty");
    }
}

/// One-shot commands fetch synchronously instead of replying "loading".
async fn ensure_cached(svc: &ScanService, symbol: &str, exchange: &str) {
    if let Err(e) = svc.orchestrator().ensure_fetched(symbol, exchange).await {
        tracing::warn!(symbol, error = %e, "fetch failed");
    }
}

fn parse_signals(list: &str) -> Result<SignalSet> {
    SignalSet::parse_list(list).map_err(anyhow::Error::msg)
}

fn print_reply<T: Serialize>(reply: &Reply<T>) -> Result<()> {
    print_json(reply)?;
    if reply.is_loading() {
        bail!("data is still loading");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
