//! PriceCast CLI: daily pipeline, backfill, and store inspection commands.
//!
//! Commands:
//! - `run`: one pipeline run for a date (the scheduler's entry point)
//! - `init`: rebuild the master dataset from a long fetch
//! - `status`: instruments, row counts and date ranges in the store
//! - `forecast`: print the stored forecast for an instrument
//! - `config`: print the effective configuration
//!
//! Exit code is 0 when a run finishes DONE and non-zero otherwise.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use pricecast_core::data::{FetchPeriod, MarketDataProvider, SyntheticProvider, YahooProvider};
use pricecast_runner::{
    backfill, collect_status, load_forecasts, Pipeline, PipelineConfig, ProviderKind, RunContext,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pricecast",
    about = "PriceCast: daily market price ingestion, indicators and trend forecasts"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Object store root directory (overrides config and PRICECAST_STORE_ROOT).
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Market data source (overrides config).
    #[arg(long, global = true, value_enum)]
    provider: Option<ProviderArg>,

    /// Also append logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Yahoo,
    Synthetic,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once: fetch, merge, derive features, forecast.
    Run {
        /// Logical run date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Print the run summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rebuild the master dataset from a long fetch. Replaces existing history.
    Init {
        /// Fetch period (e.g. 5y, 1y, 6mo). Defaults to the configured backfill period.
        #[arg(long)]
        period: Option<String>,

        /// Last date to fetch (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,
    },
    /// Report what the store holds.
    Status {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the stored forecast for one instrument.
    Forecast {
        instrument: String,

        /// Number of rows to print.
        #[arg(long, default_value_t = 10)]
        head: usize,
    },
    /// Print the effective configuration and its hash.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.clone())?;
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run { date, json } => run_pipeline(&config, date.as_deref(), json),
        Commands::Init { period, end } => run_init(&config, period.as_deref(), end.as_deref()),
        Commands::Status { json } => run_status(&config, json),
        Commands::Forecast { instrument, head } => run_forecast(&config, &instrument, head),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            println!("# config hash: {}", config.config_hash()?);
            Ok(())
        }
    }
}

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so `--json` output on stdout stays parseable.
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (writer, guard) = non_blocking(file);
        // Keep the worker alive for the whole process.
        Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

/// File (or defaults), then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(root) = &cli.store_root {
        config.store.root = root.clone();
    }
    if let Some(p) = cli.provider {
        config.provider.kind = match p {
            ProviderArg::Yahoo => ProviderKind::Yahoo,
            ProviderArg::Synthetic => ProviderKind::Synthetic,
        };
    }
    config.validate()?;
    Ok(config)
}

fn build_provider(config: &PipelineConfig) -> Result<Box<dyn MarketDataProvider>> {
    Ok(match config.provider.kind {
        ProviderKind::Yahoo => Box::new(YahooProvider::new(config.provider.yahoo_settings())?),
        ProviderKind::Synthetic => Box::new(SyntheticProvider::new(config.provider.seed)),
    })
}

fn parse_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn run_pipeline(config: &PipelineConfig, date: Option<&str>, json: bool) -> Result<()> {
    let run_date = parse_date(date)?;
    let provider = build_provider(config)?;
    let store = config.local_store();

    let pipeline = Pipeline::new(config, provider.as_ref(), &store)?;
    let summary = pipeline.run(&RunContext::new(run_date))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.render());
    }

    if !summary.is_done() {
        bail!("run for {run_date} finished {}", summary.state);
    }
    Ok(())
}

fn run_init(config: &PipelineConfig, period: Option<&str>, end: Option<&str>) -> Result<()> {
    let period: Option<FetchPeriod> = period
        .map(|p| p.parse().map_err(|e| anyhow!("invalid period '{p}': {e}")))
        .transpose()?;
    let end = parse_date(end)?;
    let provider = build_provider(config)?;
    let store = config.local_store();

    let report = backfill(config, provider.as_ref(), &store, period, end)?;
    info!(rows = report.meta.rows, "backfill complete");

    println!(
        "Backfilled {} rows for {} instruments ({} ending {})",
        report.meta.rows,
        report.loaded.len(),
        report.period,
        report.end
    );
    for (instrument, reason) in &report.skipped {
        eprintln!("Skipped {instrument}: {reason}");
    }
    Ok(())
}

fn run_status(config: &PipelineConfig, json: bool) -> Result<()> {
    let store = config.local_store();
    let status = collect_status(config, &store)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Store: {}", config.store.root.display());
        print!("{}", status.render());
    }
    Ok(())
}

fn run_forecast(config: &PipelineConfig, instrument: &str, head: usize) -> Result<()> {
    let store = config.local_store();
    let instrument = instrument.trim().to_ascii_uppercase();
    let records = load_forecasts(config, &store, &instrument, Some(head))?;
    if records.is_empty() {
        println!("No forecast rows for {instrument}");
        return Ok(());
    }
    println!("{:<10}  {:>14}", "date", "predicted_close");
    for r in &records {
        println!("{:<10}  {:>14.2}", r.date.to_string(), r.predicted_close);
    }
    Ok(())
}
