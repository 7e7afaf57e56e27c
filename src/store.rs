//! SQLite-backed time-series store.
//!
//! The store owns the price/market-cap history: logically a pair of
//! (date x ticker) matrices, physically one `observations` table keyed by
//! field. Absence of a row is the only representation of a missing value;
//! zero is never written. The `trading_days` table is the row axis (the
//! gap-free business-day spine the backfill engine and EMA walk over), and
//! `tickers` is the column axis.
//!
//! Any database error here is a persistence failure: fatal for the run, so
//! downstream aggregation never computes over a half-written store.

use std::str::FromStr;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::calendar;
use crate::error::StoreError;
use crate::models::{FieldKind, Observation, Ticker, ValueSource};
use crate::models::{ScoreScope, SentimentScore};

/// Result of an `append_or_update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The cell was inserted or upgraded.
    Written,
    /// The cell already held a value the write was not allowed to replace
    /// (backfill never overwrites an existing value).
    Skipped,
}

/// Aggregate store statistics for status reporting.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub tickers: i64,
    pub observations: i64,
    pub trading_days: i64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// One row of the coverage-history ledger.
#[derive(Debug, Clone)]
pub struct CoverageLedgerEntry {
    pub date: NaiveDate,
    pub total_fields: i64,
    pub authentic: i64,
    pub backfilled: i64,
    pub missing: i64,
}

#[derive(Clone)]
pub struct TimeSeriesStore {
    pool: SqlitePool,
}

impl TimeSeriesStore {
    /// Open (creating if necessary) the store at the given path.
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        // WAL for concurrent worker writes.
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("time-series store ready at {database_path}");
        Ok(store)
    }

    /// In-memory store for tests. Single connection: each SQLite `:memory:`
    /// connection is its own database.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT UNIQUE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                ticker_id INTEGER NOT NULL REFERENCES tickers(id),
                date DATE NOT NULL,
                field TEXT NOT NULL,
                value REAL NOT NULL,
                source TEXT NOT NULL,
                PRIMARY KEY (ticker_id, date, field)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_date ON observations(date)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS trading_days (date DATE PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sentiment_history (
                date DATE NOT NULL,
                scope TEXT NOT NULL,
                raw_score REAL NOT NULL,
                normalized_score REAL NOT NULL,
                PRIMARY KEY (date, scope)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS coverage_history (
                date DATE PRIMARY KEY,
                total_fields INTEGER NOT NULL,
                authentic INTEGER NOT NULL,
                backfilled INTEGER NOT NULL,
                missing INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Column axis
    // ------------------------------------------------------------------

    /// Register any newly configured tickers as columns. Existing tickers
    /// are untouched.
    pub async fn ensure_tickers(&self, tickers: &[Ticker]) -> Result<(), StoreError> {
        for ticker in tickers {
            sqlx::query("INSERT OR IGNORE INTO tickers (symbol) VALUES (?)")
                .bind(ticker.as_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn tracked_tickers(&self) -> Result<Vec<Ticker>, StoreError> {
        let rows = sqlx::query("SELECT symbol FROM tickers ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;
        let mut tickers = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol: String = row.get("symbol");
            // Symbols were validated on the way in.
            if let Ok(ticker) = Ticker::new(&symbol) {
                tickers.push(ticker);
            }
        }
        Ok(tickers)
    }

    async fn ticker_id(&self, ticker: &Ticker) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT id FROM tickers WHERE symbol = ?")
            .bind(ticker.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.get::<i64, _>("id"))
            .ok_or_else(|| StoreError::UnknownTicker(ticker.to_string()))
    }

    // ------------------------------------------------------------------
    // Cell writes
    // ------------------------------------------------------------------

    /// Idempotent upsert of one cell.
    ///
    /// Monotonic coverage: a written cell is never reverted to absent, and a
    /// backfilled value never replaces an existing one. An authentic value
    /// (provider or calculated) may replace anything, which lets a late
    /// same-day fetch upgrade a backfilled cell.
    pub async fn append_or_update(
        &self,
        date: NaiveDate,
        ticker: &Ticker,
        field: FieldKind,
        value: f64,
        source: &ValueSource,
    ) -> Result<WriteOutcome, StoreError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(StoreError::InvalidValue {
                symbol: ticker.to_string(),
                field: field.as_str(),
                date,
                value,
            });
        }
        let ticker_id = self.ticker_id(ticker).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO observations (ticker_id, date, field, value, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(ticker_id, date, field) DO UPDATE SET
                value = excluded.value,
                source = excluded.source
            WHERE excluded.source <> 'backfill'
            "#,
        )
        .bind(ticker_id)
        .bind(date)
        .bind(field.as_str())
        .bind(value)
        .bind(source.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(WriteOutcome::Written)
        } else {
            Ok(WriteOutcome::Skipped)
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The cell value and source for one (ticker, field, date), if present.
    pub async fn value_on(
        &self,
        ticker: &Ticker,
        field: FieldKind,
        date: NaiveDate,
    ) -> Result<Option<(f64, ValueSource)>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT o.value, o.source
            FROM observations o
            JOIN tickers t ON t.id = o.ticker_id
            WHERE t.symbol = ? AND o.field = ? AND o.date = ?
            "#,
        )
        .bind(ticker.as_str())
        .bind(field.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            (
                r.get::<f64, _>("value"),
                ValueSource::from_str(&r.get::<String, _>("source")),
            )
        }))
    }

    /// Most recent non-absent cell on or before `date`. Returns `None` when
    /// the ticker has never had a value for the field.
    pub async fn last_known_value(
        &self,
        ticker: &Ticker,
        field: FieldKind,
        before_or_on: NaiveDate,
    ) -> Result<Option<(NaiveDate, f64)>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT o.date, o.value
            FROM observations o
            JOIN tickers t ON t.id = o.ticker_id
            WHERE t.symbol = ? AND o.field = ? AND o.date <= ?
            ORDER BY o.date DESC
            LIMIT 1
            "#,
        )
        .bind(ticker.as_str())
        .bind(field.as_str())
        .bind(before_or_on)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (r.get::<NaiveDate, _>("date"), r.get::<f64, _>("value"))))
    }

    /// All values for one (ticker, field) in `[from, to]`, ascending.
    pub async fn range_query(
        &self,
        ticker: &Ticker,
        field: FieldKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT o.date, o.value
            FROM observations o
            JOIN tickers t ON t.id = o.ticker_id
            WHERE t.symbol = ? AND o.field = ? AND o.date BETWEEN ? AND ?
            ORDER BY o.date ASC
            "#,
        )
        .bind(ticker.as_str())
        .bind(field.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<NaiveDate, _>("date"), r.get::<f64, _>("value")))
            .collect())
    }

    /// Full ascending series for one (ticker, field) through `through`.
    /// Includes backfilled values; the EMA must never see gaps.
    pub async fn series_through(
        &self,
        ticker: &Ticker,
        field: FieldKind,
        through: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT o.date, o.value
            FROM observations o
            JOIN tickers t ON t.id = o.ticker_id
            WHERE t.symbol = ? AND o.field = ? AND o.date <= ?
            ORDER BY o.date ASC
            "#,
        )
        .bind(ticker.as_str())
        .bind(field.as_str())
        .bind(through)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<NaiveDate, _>("date"), r.get::<f64, _>("value")))
            .collect())
    }

    /// All tracked tickers' observations for one day.
    ///
    /// Weekend dates are served as read-only copies of the prior business
    /// day: the returned observations carry the effective (business) date.
    pub async fn daily_row(&self, date: NaiveDate) -> Result<Vec<Observation>, StoreError> {
        let effective = calendar::business_day_on_or_before(date);
        let tickers = self.tracked_tickers().await?;
        let mut observations: Vec<Observation> = tickers
            .into_iter()
            .map(|t| Observation::empty(t, effective))
            .collect();

        let rows = sqlx::query(
            r#"
            SELECT t.symbol, o.field, o.value, o.source
            FROM observations o
            JOIN tickers t ON t.id = o.ticker_id
            WHERE o.date = ?
            "#,
        )
        .bind(effective)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let symbol: String = row.get("symbol");
            let field: String = row.get("field");
            let value: f64 = row.get("value");
            let source = ValueSource::from_str(&row.get::<String, _>("source"));
            if let Some(obs) = observations.iter_mut().find(|o| o.ticker.as_str() == symbol) {
                let field = if field == FieldKind::Price.as_str() {
                    FieldKind::Price
                } else {
                    FieldKind::MarketCap
                };
                obs.set(field, value, source);
            }
        }
        Ok(observations)
    }

    // ------------------------------------------------------------------
    // Trading-day spine
    // ------------------------------------------------------------------

    pub async fn spine_is_empty(&self) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trading_days")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") == 0)
    }

    pub async fn add_trading_day(&self, date: NaiveDate) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO trading_days (date) VALUES (?)")
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn seed_spine(&self, days: &[NaiveDate]) -> Result<(), StoreError> {
        for day in days {
            self.add_trading_day(*day).await?;
        }
        Ok(())
    }

    /// All spine days on or before `through`, ascending.
    pub async fn trading_days_through(
        &self,
        through: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let rows = sqlx::query(
            "SELECT date FROM trading_days WHERE date <= ? ORDER BY date ASC",
        )
        .bind(through)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<NaiveDate, _>("date")).collect())
    }

    // ------------------------------------------------------------------
    // Ledgers
    // ------------------------------------------------------------------

    /// Append a score to the sentiment ledger. Same-day re-runs are
    /// idempotent; historical entries are never edited otherwise.
    pub async fn record_sentiment(&self, score: &SentimentScore) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sentiment_history (date, scope, raw_score, normalized_score)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date, scope) DO UPDATE SET
                raw_score = excluded.raw_score,
                normalized_score = excluded.normalized_score
            "#,
        )
        .bind(score.date)
        .bind(score.scope.as_str())
        .bind(score.raw_score)
        .bind(score.normalized_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn sentiment_on(&self, date: NaiveDate) -> Result<Vec<SentimentScore>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT scope, raw_score, normalized_score
            FROM sentiment_history
            WHERE date = ?
            ORDER BY scope
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                SentimentScore::from_raw(
                    date,
                    ScoreScope::from_str(&r.get::<String, _>("scope")),
                    r.get::<f64, _>("raw_score"),
                )
            })
            .collect())
    }

    pub async fn record_coverage(&self, entry: &CoverageLedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO coverage_history (date, total_fields, authentic, backfilled, missing)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                total_fields = excluded.total_fields,
                authentic = excluded.authentic,
                backfilled = excluded.backfilled,
                missing = excluded.missing
            "#,
        )
        .bind(entry.date)
        .bind(entry.total_fields)
        .bind(entry.authentic)
        .bind(entry.backfilled)
        .bind(entry.missing)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn coverage_trend(
        &self,
        limit: i64,
    ) -> Result<Vec<CoverageLedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT date, total_fields, authentic, backfilled, missing
            FROM coverage_history
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| CoverageLedgerEntry {
                date: r.get("date"),
                total_fields: r.get("total_fields"),
                authentic: r.get("authentic"),
                backfilled: r.get("backfilled"),
                missing: r.get("missing"),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let tickers = sqlx::query("SELECT COUNT(*) AS n FROM tickers")
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("n");
        let observations = sqlx::query("SELECT COUNT(*) AS n FROM observations")
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("n");
        let trading_days = sqlx::query("SELECT COUNT(*) AS n FROM trading_days")
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("n");
        let bounds = sqlx::query(
            "SELECT MIN(date) AS first_date, MAX(date) AS last_date FROM trading_days",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            tickers,
            observations,
            trading_days,
            first_date: bounds.try_get::<NaiveDate, _>("first_date").ok(),
            last_date: bounds.try_get::<NaiveDate, _>("last_date").ok(),
        })
    }
}

impl std::fmt::Debug for TimeSeriesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSeriesStore").finish_non_exhaustive()
    }
}
