//! Acquisition run orchestration.
//!
//! One run, for one target date: seed or extend the trading-day spine,
//! fetch the universe through the provider cascade with a bounded worker
//! pool, merge into the store, backfill, audit coverage, then derive sector
//! momentum and sentiment and append the scores to the ledger.
//!
//! Runs are single-flight per date: a second run for a date already in
//! flight is rejected instead of queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::api::{build_cascade, ProviderHandle};
use crate::backfill::{self, BackfillReport};
use crate::calendar;
use crate::config::Config;
use crate::coverage::{self, CoverageReport};
use crate::error::PulseError;
use crate::models::{FieldKind, Observation, SectorSnapshot, SentimentScore, Ticker};
use crate::models::MacroSnapshot;
use crate::resolver::Resolver;
use crate::sector::SectorAggregator;
use crate::sentiment::SentimentEngine;
use crate::store::TimeSeriesStore;

/// Outcome of one full acquisition run.
#[derive(Debug)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub universe: usize,
    pub fetched: usize,
    /// Tickers whose cells were already authentic for the date; not
    /// re-fetched.
    pub already_complete: usize,
    /// Tickers skipped because the run deadline passed before their turn.
    pub skipped_deadline: usize,
    pub fields_written: usize,
    pub backfill: BackfillReport,
    pub coverage: CoverageReport,
    pub sector_scores: Vec<(SectorSnapshot, SentimentScore)>,
    pub pulse: Option<SentimentScore>,
}

#[derive(Debug, Default)]
struct FetchTally {
    fetched: usize,
    already_complete: usize,
    skipped_deadline: usize,
    fields_written: usize,
}

enum FetchOutcome {
    Resolved(Observation),
    AlreadyComplete,
    DeadlineSkipped,
}

pub struct Collector {
    config: Config,
    store: TimeSeriesStore,
    cascade: Vec<ProviderHandle>,
    runs_in_flight: Arc<Mutex<HashSet<NaiveDate>>>,
}

/// Releases the per-date run slot when the run ends, normally or not.
struct RunGuard {
    runs: Arc<Mutex<HashSet<NaiveDate>>>,
    date: NaiveDate,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(&self.date);
        }
    }
}

impl Collector {
    pub fn new(config: Config, store: TimeSeriesStore) -> Self {
        let cascade = build_cascade(&config);
        Self::with_cascade(config, store, cascade)
    }

    /// Build a collector over an explicit provider cascade.
    pub fn with_cascade(
        config: Config,
        store: TimeSeriesStore,
        cascade: Vec<ProviderHandle>,
    ) -> Self {
        Self {
            config,
            store,
            cascade,
            runs_in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lock_run(&self, date: NaiveDate) -> Result<RunGuard, PulseError> {
        let mut runs = self
            .runs_in_flight
            .lock()
            .map_err(|_| PulseError::Config("run registry poisoned".into()))?;
        if !runs.insert(date) {
            return Err(PulseError::RunInFlight(date));
        }
        Ok(RunGuard {
            runs: Arc::clone(&self.runs_in_flight),
            date,
        })
    }

    /// Run the full pipeline for `date`. Weekend dates resolve to the prior
    /// business day before anything else happens.
    pub async fn run(&self, date: NaiveDate, macros: &MacroSnapshot) -> Result<RunSummary, PulseError> {
        let target = calendar::business_day_on_or_before(date);
        if target != date {
            info!(requested = %date, effective = %target, "non-business date, using prior business day");
        }
        let _guard = self.lock_run(target)?;

        let universe = self.config.sectors.all_tickers();
        self.prepare_spine(target).await?;
        self.store.ensure_tickers(&universe).await?;

        let tally = self.fetch_universe(&universe, target).await?;
        let backfill = backfill::backfill_through(&self.store, &universe, target).await?;
        let coverage = coverage::audit_day(&self.store, &self.config.sectors, target).await?;

        let (sector_scores, pulse) = self.score(target, macros).await?;
        for (_, score) in &sector_scores {
            self.store.record_sentiment(score).await?;
        }
        if let Some(pulse) = &pulse {
            self.store.record_sentiment(pulse).await?;
        }

        let summary = RunSummary {
            date: target,
            universe: universe.len(),
            fetched: tally.fetched,
            already_complete: tally.already_complete,
            skipped_deadline: tally.skipped_deadline,
            fields_written: tally.fields_written,
            backfill,
            coverage,
            sector_scores,
            pulse,
        };
        info!(
            date = %summary.date,
            fetched = summary.fetched,
            fields_written = summary.fields_written,
            backfilled = summary.backfill.filled,
            authentic_pct = format!("{:.1}", summary.coverage.authentic_pct()),
            pulse = summary.pulse.as_ref().map(|p| p.normalized_score),
            "run complete"
        );
        Ok(summary)
    }

    /// First run seeds a window of empty business days so the EMA has an
    /// axis to walk; later runs just extend the spine by the target day.
    async fn prepare_spine(&self, target: NaiveDate) -> Result<(), PulseError> {
        if self.store.spine_is_empty().await? {
            let window = calendar::business_days_back(target, self.config.seed_window_days);
            info!(
                from = %window.first().map(|d| d.to_string()).unwrap_or_default(),
                to = %target,
                "seeding trading-day spine"
            );
            self.store.seed_spine(&window).await?;
        }
        self.store.add_trading_day(target).await?;
        Ok(())
    }

    async fn fetch_universe(
        &self,
        universe: &[Ticker],
        target: NaiveDate,
    ) -> Result<FetchTally, PulseError> {
        if self.cascade.is_empty() {
            warn!("no providers configured, skipping fetch phase");
            return Ok(FetchTally::default());
        }
        let resolver = Arc::new(Resolver::new(self.cascade.clone()));
        let deadline = self
            .config
            .run_deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let outcomes: Vec<Result<FetchOutcome, PulseError>> =
            stream::iter(universe.iter().cloned())
                .map(|ticker| {
                    let resolver = Arc::clone(&resolver);
                    let store = self.store.clone();
                    async move {
                        if let Some(deadline) = deadline {
                            if Instant::now() >= deadline {
                                warn!(ticker = %ticker, "run deadline reached, skipping fetch");
                                return Ok(FetchOutcome::DeadlineSkipped);
                            }
                        }
                        // Re-runs leave already-authentic tickers alone.
                        if ticker_is_complete(&store, &ticker, target).await? {
                            return Ok(FetchOutcome::AlreadyComplete);
                        }
                        Ok(FetchOutcome::Resolved(resolver.resolve(&ticker, target).await))
                    }
                })
                .buffer_unordered(self.config.fetch_workers.max(1))
                .collect()
                .await;

        let mut tally = FetchTally::default();
        for outcome in outcomes {
            let observation = match outcome? {
                FetchOutcome::Resolved(observation) => observation,
                FetchOutcome::AlreadyComplete => {
                    tally.already_complete += 1;
                    continue;
                }
                FetchOutcome::DeadlineSkipped => {
                    tally.skipped_deadline += 1;
                    continue;
                }
            };
            tally.fetched += 1;
            for field in FieldKind::ALL {
                if let (Some(value), Some(source)) =
                    (observation.value(field), observation.source(field))
                {
                    self.store
                        .append_or_update(target, &observation.ticker, field, value, source)
                        .await?;
                    tally.fields_written += 1;
                }
            }
        }
        Ok(tally)
    }

    async fn score(
        &self,
        target: NaiveDate,
        macros: &MacroSnapshot,
    ) -> Result<(Vec<(SectorSnapshot, SentimentScore)>, Option<SentimentScore>), PulseError> {
        let aggregator = SectorAggregator::new(&self.store, self.config.ema_span);
        let snapshots = aggregator.snapshot_all(&self.config.sectors, target).await?;

        let engine = SentimentEngine::new(&self.config.sentiment, self.config.pulse_weighting);
        let scored: Vec<(SectorSnapshot, SentimentScore)> = snapshots
            .into_iter()
            .map(|snapshot| {
                let score = engine.score_sector(target, &snapshot, macros);
                (snapshot, score)
            })
            .collect();
        let pulse = engine.compose_pulse(target, &scored);
        Ok((scored, pulse))
    }

    /// Backfill-only entry point: no fetching, no scoring. An optional
    /// `from` date extends the spine over that historical window first, so
    /// the fill replays across it.
    pub async fn backfill_only(
        &self,
        date: NaiveDate,
        from: Option<NaiveDate>,
    ) -> Result<BackfillReport, PulseError> {
        let target = calendar::business_day_on_or_before(date);
        let _guard = self.lock_run(target)?;
        let universe = self.config.sectors.all_tickers();
        self.prepare_spine(target).await?;
        if let Some(from) = from {
            let window = calendar::business_days_between(from, target);
            self.store.seed_spine(&window).await?;
        }
        self.store.ensure_tickers(&universe).await?;
        let report = backfill::backfill_through(&self.store, &universe, target).await?;
        coverage::audit_day(&self.store, &self.config.sectors, target).await?;
        Ok(report)
    }
}

/// A ticker is complete for the day when both fields already hold authentic
/// values.
async fn ticker_is_complete(
    store: &TimeSeriesStore,
    ticker: &Ticker,
    date: NaiveDate,
) -> Result<bool, PulseError> {
    for field in FieldKind::ALL {
        match store.value_on(ticker, field, date).await? {
            Some((_, source)) if source.is_authentic() => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("providers", &self.cascade.len())
            .finish_non_exhaustive()
    }
}
