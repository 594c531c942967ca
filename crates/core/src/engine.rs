//! Immutable bundle of the derived state behind every recommendation request.
//!
//! A snapshot is built once from caller-supplied inputs and never mutated. Refreshing data means
//! building a new snapshot and swapping it into a [`SnapshotStore`]; requests already holding the
//! previous `Arc` finish against it.

use crate::config::RecommenderOptions;
use crate::domain::instrument::{Instrument, MarketDataPoint, UserHoldings};
use crate::domain::recommendation::{Explanation, Recommendation};
use crate::domain::sector::SectorMetrics;
use crate::error::{RecommenderError, Result};
use crate::explain::explain;
use crate::features::{encode_features, FeatureVectors};
use crate::recommend::{get_recommendations, get_sector_based_recommendations, SectorTrendOptions};
use crate::sectors::{analyze_sectors, SectorAnalysis};
use crate::similarity::{build_similarity, SimilarityMatrix};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct RecommenderSnapshot {
    features: FeatureVectors,
    similarity: SimilarityMatrix,
    sectors: Option<SectorAnalysis>,
    holdings: UserHoldings,
    sector_trend: SectorTrendOptions,
}

impl RecommenderSnapshot {
    /// Analyzes sectors (when market data is present), encodes features, and builds the
    /// similarity matrix.
    pub fn build(
        instruments: &[Instrument],
        holdings: UserHoldings,
        market_data: &[MarketDataPoint],
        options: &RecommenderOptions,
    ) -> Result<Self> {
        let sectors = if market_data.is_empty() {
            None
        } else {
            Some(analyze_sectors(market_data, &options.windows)?)
        };

        let momentum = sectors
            .as_ref()
            .map(|a| a.momentum_scores(&options.momentum_timeframe))
            .transpose()?;

        let features = encode_features(instruments, momentum.as_ref())?;
        let similarity = build_similarity(&features)?;

        tracing::info!(
            instruments = features.len(),
            dimension = features.layout().dimension(),
            users = holdings.len(),
            market_points = market_data.len(),
            "built recommender snapshot"
        );

        Ok(Self {
            features,
            similarity,
            sectors,
            holdings,
            sector_trend: SectorTrendOptions {
                trending_sectors: options.trending_sectors,
                backfill: options.sector_backfill,
            },
        })
    }

    pub fn features(&self) -> &FeatureVectors {
        &self.features
    }

    pub fn similarity(&self) -> &SimilarityMatrix {
        &self.similarity
    }

    pub fn holdings(&self) -> &UserHoldings {
        &self.holdings
    }

    pub fn sector_analysis(&self) -> Result<&SectorAnalysis> {
        self.sectors
            .as_ref()
            .ok_or_else(|| RecommenderError::insufficient("sector analysis (no market data)", 2, 0))
    }

    pub fn get_recommendations(&self, user_id: &str, n: usize) -> Result<Vec<Recommendation>> {
        get_recommendations(&self.holdings, &self.features, &self.similarity, user_id, n)
    }

    pub fn get_sector_based_recommendations(
        &self,
        n: usize,
        timeframe: &str,
    ) -> Result<Vec<Recommendation>> {
        get_sector_based_recommendations(
            self.sector_analysis()?,
            &self.features,
            n,
            timeframe,
            &self.sector_trend,
        )
    }

    pub fn get_trending_sectors(&self, timeframe: &str, top_n: usize) -> Result<&[SectorMetrics]> {
        self.sector_analysis()?.get_trending_sectors(timeframe, top_n)
    }

    pub fn explain<'a>(
        &self,
        recommended_id: &str,
        held_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<Explanation>> {
        explain(&self.similarity, recommended_id, held_ids)
    }

    /// Explains `recommended_id` against the registered holdings of `user_id`.
    pub fn explain_for_user(&self, user_id: &str, recommended_id: &str) -> Result<Vec<Explanation>> {
        let portfolio = self.holdings.portfolio(user_id)?;
        explain(
            &self.similarity,
            recommended_id,
            portfolio.keys().map(String::as_str),
        )
    }
}

/// Shared handle to the current snapshot with copy-on-rebuild replacement.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    current: Arc<RwLock<Arc<RecommenderSnapshot>>>,
}

impl SnapshotStore {
    pub fn new(snapshot: RecommenderSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub fn current(&self) -> Arc<RecommenderSnapshot> {
        // The lock only guards an Arc swap, which cannot leave it half-written.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Installs `snapshot` for subsequent requests and returns the one it replaced.
    pub fn replace(&self, snapshot: RecommenderSnapshot) -> Arc<RecommenderSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{Holding, Portfolio};
    use crate::sectors::tests::{series, trending_returns};
    use chrono::NaiveDate;

    fn instruments() -> Vec<Instrument> {
        [
            ("AAPL", "Technology", 2000.0, 25.0),
            ("MSFT", "Technology", 1800.0, 30.0),
            ("XOM", "Energy", 400.0, 12.0),
            ("CVX", "Energy", 300.0, 14.0),
        ]
        .iter()
        .map(|(id, sector, mc, pe)| Instrument {
            instrument_id: id.to_string(),
            sector: sector.to_string(),
            market_cap: *mc,
            pe_ratio: *pe,
            dividend_yield: 1.0,
            volatility: 0.2,
            beta: 1.0,
        })
        .collect()
    }

    fn holdings() -> UserHoldings {
        let portfolio: Portfolio = [(
            "AAPL".to_string(),
            Holding {
                quantity: 100.0,
                purchase_price: 150.0,
            },
        )]
        .into_iter()
        .collect();
        let mut h = UserHoldings::new();
        h.register("user1", portfolio);
        h
    }

    fn market_data() -> Vec<MarketDataPoint> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut data = series("AAPL", "Technology", start, &trending_returns(0.10, 0.02, 30));
        data.extend(series("XOM", "Energy", start, &trending_returns(-0.05, 0.05, 30)));
        data
    }

    #[test]
    fn snapshot_serves_both_strategies() {
        let snap = RecommenderSnapshot::build(
            &instruments(),
            holdings(),
            &market_data(),
            &RecommenderOptions::default(),
        )
        .unwrap();

        assert!(snap.features().layout().momentum_column().is_some());

        let recs = snap.get_recommendations("user1", 2).unwrap();
        assert_eq!(recs[0].instrument_id, "MSFT");

        let trending = snap.get_trending_sectors("month", 1).unwrap();
        assert_eq!(trending[0].sector, "Technology");

        let sector_recs = snap.get_sector_based_recommendations(2, "month").unwrap();
        assert_eq!(sector_recs.len(), 2);
        assert_eq!(sector_recs[0].sector, "Technology");

        let why = snap.explain_for_user("user1", "MSFT").unwrap();
        assert_eq!(why[0].held_instrument_id, "AAPL");
    }

    #[test]
    fn sector_queries_without_market_data_are_insufficient() {
        let snap = RecommenderSnapshot::build(
            &instruments(),
            holdings(),
            &[],
            &RecommenderOptions::default(),
        )
        .unwrap();
        assert!(snap.features().layout().momentum_column().is_none());
        assert!(matches!(
            snap.get_trending_sectors("month", 3),
            Err(RecommenderError::InsufficientData { .. })
        ));
        assert!(snap.get_recommendations("user1", 3).is_ok());
    }

    #[test]
    fn unknown_momentum_timeframe_fails_the_build() {
        let options = RecommenderOptions {
            momentum_timeframe: "decade".to_string(),
            ..RecommenderOptions::default()
        };
        assert!(matches!(
            RecommenderSnapshot::build(&instruments(), holdings(), &market_data(), &options),
            Err(RecommenderError::InvalidTimeframe { .. })
        ));
    }

    #[test]
    fn replacing_a_snapshot_leaves_in_flight_handles_untouched() {
        let options = RecommenderOptions::default();
        let first = RecommenderSnapshot::build(&instruments(), holdings(), &[], &options).unwrap();
        let store = SnapshotStore::new(first);

        let in_flight = store.current();
        let smaller =
            RecommenderSnapshot::build(&instruments()[..2], holdings(), &[], &options).unwrap();
        let previous = store.replace(smaller);

        assert!(Arc::ptr_eq(&in_flight, &previous));
        assert_eq!(in_flight.similarity().len(), 4);
        assert_eq!(store.current().similarity().len(), 2);
    }
}
