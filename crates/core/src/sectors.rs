//! Per-sector, per-window performance and momentum ranking.
//!
//! Periodic returns and volume changes are computed per instrument over its full, date-ordered
//! history and attached to the later observation of each pair. A window then keeps the
//! observations dated within `days` of the latest date in the data. A missing date is a gap
//! between two observations, never a zero.

use crate::domain::instrument::MarketDataPoint;
use crate::domain::metric::{MetricResult, UndefinedReason};
use crate::domain::sector::SectorMetrics;
use crate::error::{RecommenderError, Result};
use crate::time::Window;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Volatility at or below this is treated as zero when forming the momentum ratio.
const MIN_VOLATILITY: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorAnalysis {
    latest_date: NaiveDate,
    windows: Vec<Window>,
    /// Window name -> sectors ordered by rank.
    rankings: BTreeMap<String, Vec<SectorMetrics>>,
}

impl SectorAnalysis {
    pub fn latest_date(&self) -> NaiveDate {
        self.latest_date
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn timeframes(&self) -> Vec<String> {
        self.windows.iter().map(|w| w.name.clone()).collect()
    }

    /// Every sector observed in the window, ordered by rank.
    pub fn metrics(&self, timeframe: &str) -> Result<&[SectorMetrics]> {
        self.rankings
            .get(timeframe)
            .map(Vec::as_slice)
            .ok_or_else(|| RecommenderError::InvalidTimeframe {
                requested: timeframe.to_string(),
                available: self.timeframes(),
            })
    }

    /// The `top_n` best-ranked sectors with a computed momentum score.
    pub fn get_trending_sectors(&self, timeframe: &str, top_n: usize) -> Result<&[SectorMetrics]> {
        let ranked = self.metrics(timeframe)?;
        let computed = ranked
            .iter()
            .take_while(|m| m.momentum_score.is_computed())
            .count();
        Ok(&ranked[..computed.min(top_n)])
    }

    /// Computed momentum scores of the window, keyed by sector.
    pub fn momentum_scores(&self, timeframe: &str) -> Result<BTreeMap<String, f64>> {
        Ok(self
            .metrics(timeframe)?
            .iter()
            .filter_map(|m| m.momentum_score.value().map(|v| (m.sector.clone(), v)))
            .collect())
    }
}

struct Observation<'a> {
    date: NaiveDate,
    sector: &'a str,
    ret: Option<f64>,
    volume_change: Option<f64>,
}

#[derive(Default)]
struct SectorBucket {
    returns: Vec<f64>,
    volume_changes: Vec<f64>,
}

pub fn analyze_sectors(market_data: &[MarketDataPoint], windows: &[Window]) -> Result<SectorAnalysis> {
    if windows.is_empty() {
        return Err(RecommenderError::insufficient("look-back windows", 1, 0));
    }
    if market_data.len() < 2 {
        return Err(RecommenderError::insufficient(
            "market data",
            2,
            market_data.len(),
        ));
    }

    let mut by_instrument: BTreeMap<&str, Vec<&MarketDataPoint>> = BTreeMap::new();
    for point in market_data {
        by_instrument
            .entry(point.instrument_id.as_str())
            .or_default()
            .push(point);
    }

    let longest = by_instrument.values().map(Vec::len).max().unwrap_or(0);
    if longest < 2 {
        return Err(RecommenderError::insufficient(
            "instrument price history",
            2,
            longest,
        ));
    }

    let mut observations = Vec::with_capacity(market_data.len());
    for series in by_instrument.values_mut() {
        series.sort_by_key(|p| p.date);
        for (i, point) in series.iter().enumerate() {
            let prev = i.checked_sub(1).map(|j| series[j]);
            observations.push(Observation {
                date: point.date,
                sector: point.sector.as_str(),
                ret: prev.and_then(|p| pct_change(p.price, point.price)),
                volume_change: prev.and_then(|p| pct_change(p.volume, point.volume)),
            });
        }
    }

    // Non-empty: market_data has at least two points.
    let latest_date = market_data
        .iter()
        .map(|p| p.date)
        .max()
        .unwrap_or(NaiveDate::MIN);

    let mut rankings = BTreeMap::new();
    for window in windows {
        let mut buckets: BTreeMap<&str, SectorBucket> = BTreeMap::new();
        for obs in observations
            .iter()
            .filter(|o| window.contains(latest_date, o.date))
        {
            let bucket = buckets.entry(obs.sector).or_default();
            if let Some(r) = obs.ret {
                bucket.returns.push(r);
            }
            if let Some(v) = obs.volume_change {
                bucket.volume_changes.push(v);
            }
        }

        let mut metrics: Vec<SectorMetrics> = buckets
            .into_iter()
            .map(|(sector, bucket)| sector_metrics(sector, &window.name, &bucket))
            .collect();
        rank_sectors(&mut metrics);

        tracing::debug!(
            window = %window.name,
            days = window.days,
            %latest_date,
            sectors = metrics.len(),
            "computed sector metrics"
        );

        rankings.insert(window.name.clone(), metrics);
    }

    Ok(SectorAnalysis {
        latest_date,
        windows: windows.to_vec(),
        rankings,
    })
}

fn pct_change(prev: f64, current: f64) -> Option<f64> {
    if prev > 0.0 && prev.is_finite() {
        Some(current / prev - 1.0).filter(|v| v.is_finite())
    } else {
        None
    }
}

fn sector_metrics(sector: &str, window: &str, bucket: &SectorBucket) -> SectorMetrics {
    let cumulative_return = if bucket.returns.is_empty() {
        MetricResult::Undefined(UndefinedReason::InsufficientData)
    } else {
        MetricResult::from_value(bucket.returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0)
    };
    let volatility = sample_std(&bucket.returns);
    let volume_change = mean(&bucket.volume_changes);
    let momentum_score = momentum(cumulative_return, volatility, volume_change);

    SectorMetrics {
        sector: sector.to_string(),
        window: window.to_string(),
        rank: 0,
        cumulative_return,
        volatility,
        volume_change,
        momentum_score,
        observations: bucket.returns.len(),
    }
}

/// `(return / volatility) * (1 + volume_change)`.
fn momentum(ret: MetricResult, volatility: MetricResult, volume_change: MetricResult) -> MetricResult {
    match (ret, volatility, volume_change) {
        (MetricResult::Computed(r), MetricResult::Computed(vol), MetricResult::Computed(vc)) => {
            if vol <= MIN_VOLATILITY {
                MetricResult::Undefined(UndefinedReason::ZeroVolatility)
            } else {
                MetricResult::from_value(r / vol * (1.0 + vc))
            }
        }
        (MetricResult::Undefined(reason), _, _)
        | (_, MetricResult::Undefined(reason), _)
        | (_, _, MetricResult::Undefined(reason)) => MetricResult::Undefined(reason),
    }
}

/// Momentum descending, then return descending, then sector name.
fn rank_sectors(metrics: &mut [SectorMetrics]) {
    metrics.sort_by(|a, b| {
        a.momentum_score
            .cmp_desc(&b.momentum_score)
            .then_with(|| a.cumulative_return.cmp_desc(&b.cumulative_return))
            .then_with(|| a.sector.cmp(&b.sector))
    });
    for (i, m) in metrics.iter_mut().enumerate() {
        m.rank = i + 1;
    }
}

fn mean(values: &[f64]) -> MetricResult {
    if values.is_empty() {
        return MetricResult::Undefined(UndefinedReason::InsufficientData);
    }
    MetricResult::from_value(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(values: &[f64]) -> MetricResult {
    if values.len() < 2 {
        return MetricResult::Undefined(UndefinedReason::InsufficientData);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    MetricResult::from_value(var.sqrt())
}
