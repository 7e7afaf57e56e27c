//! Last-known-value forward propagation.
//!
//! After a fetch pass, any (ticker, field) cell still absent on a trading
//! day is filled with the most recent authentic-or-backfilled value before
//! it. A ticker that has never produced a value stays absent; the backfill
//! engine invents nothing.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{FieldKind, Ticker, ValueSource};
use crate::store::{TimeSeriesStore, WriteOutcome};

/// What one backfill pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Cells filled from a prior value.
    pub filled: usize,
    /// Cells already holding a value (left untouched).
    pub already_present: usize,
    /// Cells with no prior value anywhere (left absent).
    pub unfillable: usize,
}

/// Fill every absent cell on every trading day up to and including
/// `through`, walking each (ticker, field) series forward in date order so
/// a value filled on day d is available as the prior value for day d+1.
pub async fn backfill_through(
    store: &TimeSeriesStore,
    tickers: &[Ticker],
    through: NaiveDate,
) -> Result<BackfillReport, StoreError> {
    let spine = store.trading_days_through(through).await?;
    let mut report = BackfillReport::default();

    for ticker in tickers {
        for field in FieldKind::ALL {
            backfill_series(store, ticker, field, &spine, &mut report).await?;
        }
    }

    info!(
        through = %through,
        filled = report.filled,
        unfillable = report.unfillable,
        "backfill pass complete"
    );
    Ok(report)
}

async fn backfill_series(
    store: &TimeSeriesStore,
    ticker: &Ticker,
    field: FieldKind,
    spine: &[NaiveDate],
    report: &mut BackfillReport,
) -> Result<(), StoreError> {
    // One walk of the stored series against the spine; carries the last
    // known value forward instead of re-querying per day.
    let last_day = match spine.last() {
        Some(day) => *day,
        None => return Ok(()),
    };
    let series = store.series_through(ticker, field, last_day).await?;
    let mut series = series.into_iter().peekable();
    let mut carried: Option<f64> = None;

    for day in spine {
        let mut present = false;
        while let Some((date, value)) = series.peek().copied() {
            if date > *day {
                break;
            }
            carried = Some(value);
            present = date == *day;
            series.next();
        }

        if present {
            report.already_present += 1;
            continue;
        }
        match carried {
            Some(value) => {
                let outcome = store
                    .append_or_update(*day, ticker, field, value, &ValueSource::Backfill)
                    .await?;
                match outcome {
                    WriteOutcome::Written => {
                        debug!(ticker = %ticker, %field, date = %day, value, "cell backfilled");
                        report.filled += 1;
                    }
                    // Concurrent writer beat us to the cell.
                    WriteOutcome::Skipped => report.already_present += 1,
                }
            }
            None => report.unfillable += 1,
        }
    }
    Ok(())
}
