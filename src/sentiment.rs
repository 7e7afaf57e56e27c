//! Sentiment scoring.
//!
//! Macro indicator values are mapped through favourability bands to
//! -1/0/+1 signals, combined as a weighted sum, blended with the sector's
//! momentum factor, clamped to [-1, +1] and normalized onto the 0-100
//! scale. The composite pulse is the weighted mean of sector scores.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::{PulseWeighting, SentimentWeights};
use crate::models::{MacroSnapshot, ScoreScope, SectorSnapshot, SentimentScore};

/// Which side of the band is favourable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandDirection {
    /// Low values are good (rates, inflation, VIX).
    Lower,
    /// High values are good (growth, job postings).
    Higher,
}

/// A favourability band: thresholds mapping an indicator value to a signal.
/// Values between the thresholds are neutral.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    direction: BandDirection,
    favourable: f64,
    unfavourable: f64,
}

impl Band {
    pub fn new(direction: BandDirection, favourable: f64, unfavourable: f64) -> Self {
        Self {
            direction,
            favourable,
            unfavourable,
        }
    }

    /// -1, 0 or +1 for a value. Threshold values themselves are not neutral.
    pub fn signal(&self, value: f64) -> i8 {
        match self.direction {
            BandDirection::Lower => {
                if value <= self.favourable {
                    1
                } else if value >= self.unfavourable {
                    -1
                } else {
                    0
                }
            }
            BandDirection::Higher => {
                if value >= self.favourable {
                    1
                } else if value <= self.unfavourable {
                    -1
                } else {
                    0
                }
            }
        }
    }
}

pub struct SentimentEngine {
    /// Normalized (name, weight, band) triples; weights sum to 1.
    indicators: Vec<(String, f64, Band)>,
    momentum_weight: f64,
    momentum_normalization_pct: f64,
    pulse_weighting: PulseWeighting,
}

impl SentimentEngine {
    pub fn new(weights: &SentimentWeights, pulse_weighting: PulseWeighting) -> Self {
        Self {
            indicators: weights.normalized(),
            momentum_weight: weights.momentum_weight,
            momentum_normalization_pct: weights.momentum_normalization_pct,
            pulse_weighting,
        }
    }

    /// Weighted macro signal in [-1, +1]. Indicators absent from the
    /// snapshot contribute nothing; a fully empty snapshot scores neutral.
    fn macro_raw(&self, macros: &MacroSnapshot) -> f64 {
        if macros.is_empty() {
            warn!("macro snapshot is empty, macro component is neutral");
            return 0.0;
        }
        let mut raw = 0.0;
        for (name, weight, band) in &self.indicators {
            match macros.get(name) {
                Some(value) => raw += weight * f64::from(band.signal(value)),
                None => debug!(indicator = %name, "indicator missing from macro snapshot"),
            }
        }
        raw
    }

    /// Momentum percent mapped onto [-1, +1]; saturates at the configured
    /// normalization percent.
    fn momentum_factor(&self, momentum_pct: f64) -> f64 {
        (momentum_pct / self.momentum_normalization_pct).clamp(-1.0, 1.0)
    }

    /// Score one sector for the day. A sector without momentum still gets a
    /// macro-only score.
    pub fn score_sector(
        &self,
        date: NaiveDate,
        snapshot: &SectorSnapshot,
        macros: &MacroSnapshot,
    ) -> SentimentScore {
        let mut raw = self.macro_raw(macros);
        if let Some(momentum) = snapshot.momentum_pct {
            raw += self.momentum_factor(momentum) * self.momentum_weight;
        }
        SentimentScore::from_raw(date, ScoreScope::Sector(snapshot.sector.clone()), raw)
    }

    /// The composite pulse: weighted mean of sector raw scores, equal or
    /// market-cap weighted. `None` when there are no sectors to combine.
    pub fn compose_pulse(
        &self,
        date: NaiveDate,
        scored: &[(SectorSnapshot, SentimentScore)],
    ) -> Option<SentimentScore> {
        if scored.is_empty() {
            return None;
        }
        let weight_of = |snapshot: &SectorSnapshot| match self.pulse_weighting {
            PulseWeighting::Equal => 1.0,
            PulseWeighting::MarketCap => snapshot.total_market_cap,
        };
        let total_weight: f64 = scored.iter().map(|(s, _)| weight_of(s)).sum();
        if total_weight <= 0.0 {
            // Market-cap weighting with an empty store degrades to equal.
            let raw = scored.iter().map(|(_, s)| s.raw_score).sum::<f64>() / scored.len() as f64;
            return Some(SentimentScore::from_raw(date, ScoreScope::Composite, raw));
        }
        let raw = scored
            .iter()
            .map(|(snapshot, score)| weight_of(snapshot) * score.raw_score)
            .sum::<f64>()
            / total_weight;
        Some(SentimentScore::from_raw(date, ScoreScope::Composite, raw))
    }
}

impl std::fmt::Debug for SentimentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentEngine")
            .field("indicators", &self.indicators.len())
            .field("momentum_weight", &self.momentum_weight)
            .finish_non_exhaustive()
    }
}
