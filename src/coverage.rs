//! Coverage audit over one trading day.
//!
//! Counts every (ticker, field) cell as authentic, backfilled or missing,
//! breaks the tally down per sector, and appends the day's totals to the
//! coverage ledger so degradation is visible as a trend, not just a
//! single-run log line. Incomplete coverage never halts the pipeline.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::calendar;
use crate::config::SectorMap;
use crate::error::StoreError;
use crate::models::{FieldKind, Observation, Ticker};
use crate::store::{CoverageLedgerEntry, TimeSeriesStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorCoverage {
    pub sector: String,
    pub total_fields: usize,
    pub authentic: usize,
    pub backfilled: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub date: NaiveDate,
    pub total_fields: usize,
    pub authentic: usize,
    pub backfilled: usize,
    pub missing: usize,
    /// The exact absent cells, for the run log and the report command.
    pub missing_fields: Vec<(Ticker, FieldKind)>,
    pub per_sector: Vec<SectorCoverage>,
}

impl CoverageReport {
    pub fn authentic_pct(&self) -> f64 {
        if self.total_fields == 0 {
            return 0.0;
        }
        self.authentic as f64 / self.total_fields as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }
}

/// Audit the store for `date` and record the day's totals in the ledger.
pub async fn audit_day(
    store: &TimeSeriesStore,
    sectors: &SectorMap,
    date: NaiveDate,
) -> Result<CoverageReport, StoreError> {
    let effective = calendar::business_day_on_or_before(date);
    let row = store.daily_row(effective).await?;

    // The required universe is the configured one; tickers still tracked in
    // the store but dropped from the sector map are not counted.
    let universe = sectors.all_tickers();

    let mut report = CoverageReport {
        date: effective,
        total_fields: universe.len() * FieldKind::ALL.len(),
        authentic: 0,
        backfilled: 0,
        missing: 0,
        missing_fields: Vec::new(),
        per_sector: Vec::new(),
    };

    for ticker in &universe {
        let observation = row.iter().find(|o| &o.ticker == ticker);
        for field in FieldKind::ALL {
            match observation.and_then(|o| o.source(field)) {
                Some(source) if source.is_authentic() => report.authentic += 1,
                Some(_) => report.backfilled += 1,
                None => {
                    report.missing += 1;
                    report.missing_fields.push((ticker.clone(), field));
                }
            }
        }
    }

    report.per_sector = per_sector_tally(sectors, &row);

    store
        .record_coverage(&CoverageLedgerEntry {
            date: effective,
            total_fields: report.total_fields as i64,
            authentic: report.authentic as i64,
            backfilled: report.backfilled as i64,
            missing: report.missing as i64,
        })
        .await?;

    if report.missing > 0 {
        warn!(
            date = %effective,
            missing = report.missing,
            cells = ?report
                .missing_fields
                .iter()
                .map(|(t, f)| format!("{t}/{f}"))
                .collect::<Vec<_>>(),
            "coverage incomplete"
        );
    } else {
        info!(
            date = %effective,
            authentic = report.authentic,
            backfilled = report.backfilled,
            "coverage complete"
        );
    }
    Ok(report)
}

/// Tickers in several sectors count once per sector.
fn per_sector_tally(sectors: &SectorMap, row: &[Observation]) -> Vec<SectorCoverage> {
    let mut tallies = Vec::with_capacity(sectors.sector_count());
    for (sector, members) in sectors.iter() {
        let mut tally = SectorCoverage {
            sector: sector.to_string(),
            total_fields: members.len() * FieldKind::ALL.len(),
            authentic: 0,
            backfilled: 0,
            missing: 0,
        };
        for member in members {
            let observation = row.iter().find(|o| &o.ticker == member);
            for field in FieldKind::ALL {
                match observation.and_then(|o| o.source(field)) {
                    Some(source) if source.is_authentic() => tally.authentic += 1,
                    Some(_) => tally.backfilled += 1,
                    None => tally.missing += 1,
                }
            }
        }
        tallies.push(tally);
    }
    tallies
}
