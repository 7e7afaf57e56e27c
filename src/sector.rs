//! Sector momentum from price EMAs.
//!
//! Per ticker: an exponential moving average over the gap-free daily price
//! series, then momentum as the percentage deviation of the latest price
//! from that EMA. Per sector: the market-cap-weighted mean of member
//! momenta, over the members that actually have both momentum and a market
//! cap on the day.

use chrono::NaiveDate;
use tracing::debug;

use crate::config::SectorMap;
use crate::error::StoreError;
use crate::models::{FieldKind, SectorSnapshot, Ticker};
use crate::store::TimeSeriesStore;

/// EMA with alpha = 2 / (span + 1), seeded by the first value. With fewer
/// than two values there is no trend to speak of, so `None`.
pub fn ema(values: &[f64], span: usize) -> Option<f64> {
    if values.len() < 2 || span == 0 {
        return None;
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema = values[0];
    for value in &values[1..] {
        ema = alpha * value + (1.0 - alpha) * ema;
    }
    Some(ema)
}

/// (latest - ema) / ema * 100.
pub fn momentum_pct(values: &[f64], span: usize) -> Option<f64> {
    let latest = *values.last()?;
    let ema = ema(values, span)?;
    if ema <= 0.0 {
        return None;
    }
    Some((latest - ema) / ema * 100.0)
}

#[derive(Debug, Clone)]
pub struct SectorAggregator<'a> {
    store: &'a TimeSeriesStore,
    ema_span: usize,
}

impl<'a> SectorAggregator<'a> {
    pub fn new(store: &'a TimeSeriesStore, ema_span: usize) -> Self {
        Self { store, ema_span }
    }

    /// Momentum for one ticker through `date`, or `None` without enough
    /// history.
    pub async fn ticker_momentum(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
    ) -> Result<Option<f64>, StoreError> {
        let series = self
            .store
            .series_through(ticker, FieldKind::Price, date)
            .await?;
        let values: Vec<f64> = series.into_iter().map(|(_, v)| v).collect();
        Ok(momentum_pct(&values, self.ema_span))
    }

    /// Aggregate one sector for one day.
    ///
    /// Members without a market cap or without momentum are excluded from
    /// the weighted mean; the weight denominator is the market cap of the
    /// contributing members only, so absence dilutes nothing.
    pub async fn snapshot(
        &self,
        sector: &str,
        members: &[Ticker],
        date: NaiveDate,
    ) -> Result<SectorSnapshot, StoreError> {
        let mut total_market_cap = 0.0;
        let mut weighted_momentum = 0.0;
        let mut momentum_weight = 0.0;
        let mut tickers_with_data = 0;

        for ticker in members {
            let market_cap = self
                .store
                .value_on(ticker, FieldKind::MarketCap, date)
                .await?
                .map(|(v, _)| v);
            if let Some(cap) = market_cap {
                total_market_cap += cap;
                tickers_with_data += 1;
            }

            let momentum = self.ticker_momentum(ticker, date).await?;
            match (momentum, market_cap) {
                (Some(m), Some(cap)) => {
                    weighted_momentum += m * cap;
                    momentum_weight += cap;
                }
                (Some(_), None) => {
                    debug!(sector, ticker = %ticker, "momentum without market cap, excluded");
                }
                _ => {}
            }
        }

        let momentum_pct = if momentum_weight > 0.0 {
            Some(weighted_momentum / momentum_weight)
        } else {
            None
        };

        Ok(SectorSnapshot {
            sector: sector.to_string(),
            date,
            total_market_cap,
            momentum_pct,
            tickers_with_data,
            total_tickers: members.len(),
        })
    }

    /// Snapshots for every configured sector, in map order.
    pub async fn snapshot_all(
        &self,
        sectors: &SectorMap,
        date: NaiveDate,
    ) -> Result<Vec<SectorSnapshot>, StoreError> {
        let mut snapshots = Vec::new();
        for (sector, members) in sectors.iter() {
            snapshots.push(self.snapshot(sector, members, date).await?);
        }
        Ok(snapshots)
    }
}
