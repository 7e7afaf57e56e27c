use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use market_pulse::collector::Collector;
use market_pulse::config::Config;
use market_pulse::coverage;
use market_pulse::models::MacroSnapshot;
use market_pulse::store::TimeSeriesStore;

#[derive(Parser)]
#[command(author, version, about = "Market-data acquisition and sector pulse engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target date (YYYY-MM-DD); defaults to today. Weekends resolve to the
    /// prior business day.
    #[arg(long, global = true)]
    date: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the universe, backfill, audit coverage and score sentiment
    Run {
        /// JSON file mapping macro indicator names to current values
        #[arg(long)]
        macro_data: Option<PathBuf>,
    },
    /// Backfill absent cells from prior values without fetching
    Backfill {
        /// Extend the trading-day spine back to this date before filling
        #[arg(long)]
        from: Option<NaiveDate>,
    },
    /// Print the day's coverage and sentiment scores
    Report,
    /// Print store statistics and the recent coverage trend
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("market_pulse=info")),
        )
        .init();

    let cli = Cli::parse();
    let date = cli.date.unwrap_or_else(|| Local::now().date_naive());

    let config = Config::from_env().context("failed to load configuration")?;
    let store = TimeSeriesStore::connect(&config.database_path)
        .await
        .context("failed to open the time-series store")?;

    match cli.command {
        Commands::Run { macro_data } => {
            let macros = load_macro_snapshot(macro_data.as_deref())?;
            let collector = Collector::new(config, store);
            let summary = collector.run(date, &macros).await?;
            print_run_summary(&summary);
        }
        Commands::Backfill { from } => {
            let collector = Collector::new(config, store);
            let report = collector.backfill_only(date, from).await?;
            println!(
                "backfill for {date}: {} filled, {} already present, {} unfillable",
                report.filled, report.already_present, report.unfillable
            );
        }
        Commands::Report => {
            let report = coverage::audit_day(&store, &config.sectors, date).await?;
            println!(
                "coverage {}: {}/{} authentic ({:.1}%), {} backfilled, {} missing",
                report.date,
                report.authentic,
                report.total_fields,
                report.authentic_pct(),
                report.backfilled,
                report.missing
            );
            for (ticker, field) in &report.missing_fields {
                println!("missing: {ticker} {field}");
            }
            for sector in &report.per_sector {
                println!(
                    "{:<28} {}/{} authentic, {} backfilled, {} missing",
                    sector.sector,
                    sector.authentic,
                    sector.total_fields,
                    sector.backfilled,
                    sector.missing
                );
            }
            let aggregator =
                market_pulse::sector::SectorAggregator::new(&store, config.ema_span);
            for snapshot in aggregator.snapshot_all(&config.sectors, report.date).await? {
                println!(
                    "{:<28} market cap {:>14.0}  momentum {}",
                    snapshot.sector,
                    snapshot.total_market_cap,
                    snapshot
                        .momentum_pct
                        .map(|m| format!("{m:+.2}%"))
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
            let scores = store.sentiment_on(report.date).await?;
            if scores.is_empty() {
                println!("no sentiment scores recorded for {}", report.date);
            }
            for score in scores {
                println!(
                    "{:<28} {:>6.1}  {}",
                    score.scope.as_str(),
                    score.normalized_score,
                    score.category
                );
            }
        }
        Commands::Status => {
            let stats = store.stats().await?;
            println!("tickers:       {}", stats.tickers);
            println!("observations:  {}", stats.observations);
            println!("trading days:  {}", stats.trading_days);
            if let (Some(first), Some(last)) = (stats.first_date, stats.last_date) {
                println!("spine:         {first} .. {last}");
            }
            let trend = store.coverage_trend(10).await?;
            for entry in trend {
                println!(
                    "{}  authentic {:>4}  backfilled {:>4}  missing {:>4}",
                    entry.date, entry.authentic, entry.backfilled, entry.missing
                );
            }
        }
    }
    Ok(())
}

fn load_macro_snapshot(path: Option<&std::path::Path>) -> Result<MacroSnapshot> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read macro data {}", path.display()))?;
            let values: HashMap<String, f64> = serde_json::from_str(&content)
                .with_context(|| format!("invalid macro data {}", path.display()))?;
            Ok(MacroSnapshot::new(values))
        }
        None => {
            warn!("no macro data supplied, sentiment uses momentum only");
            Ok(MacroSnapshot::default())
        }
    }
}

fn print_run_summary(summary: &market_pulse::collector::RunSummary) {
    println!(
        "run {}: {}/{} tickers fetched, {} fields written, {} backfilled",
        summary.date,
        summary.fetched,
        summary.universe,
        summary.fields_written,
        summary.backfill.filled
    );
    if summary.already_complete > 0 {
        println!("{} tickers already complete, not re-fetched", summary.already_complete);
    }
    if summary.skipped_deadline > 0 {
        println!("{} tickers skipped at the run deadline", summary.skipped_deadline);
    }
    println!(
        "coverage: {:.1}% authentic, {} missing",
        summary.coverage.authentic_pct(),
        summary.coverage.missing
    );
    for (snapshot, score) in &summary.sector_scores {
        println!(
            "{:<28} momentum {:>7}  score {:>6.1}  {}",
            snapshot.sector,
            snapshot
                .momentum_pct
                .map(|m| format!("{m:+.2}%"))
                .unwrap_or_else(|| "n/a".to_string()),
            score.normalized_score,
            score.category
        );
    }
    if let Some(pulse) = &summary.pulse {
        println!(
            "pulse: {:.1} ({})",
            pulse.normalized_score, pulse.category
        );
    }
}
