use crate::domain::instrument::UserHoldings;
use crate::domain::recommendation::{Recommendation, RecommendationBasis};
use crate::domain::sector::SectorMetrics;
use crate::error::Result;
use crate::features::{FeatureVector, FeatureVectors};
use crate::sectors::SectorAnalysis;
use crate::similarity::SimilarityMatrix;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorTrendOptions {
    /// How many trending sectors to draw instruments from.
    pub trending_sectors: usize,
    /// Fill slots left empty by small sectors with further members of the trending sectors,
    /// in sector rank order.
    pub backfill: bool,
}

impl Default for SectorTrendOptions {
    fn default() -> Self {
        Self {
            trending_sectors: 3,
            backfill: true,
        }
    }
}

/// Ranks instruments the user does not hold by their summed similarity to every instrument
/// they do hold.
///
/// Holdings outside the similarity universe are ignored. A user none of whose holdings are in
/// the universe, or who holds the whole universe, gets an empty list.
pub fn get_recommendations(
    holdings: &UserHoldings,
    features: &FeatureVectors,
    similarity: &SimilarityMatrix,
    user_id: &str,
    n: usize,
) -> Result<Vec<Recommendation>> {
    let portfolio = holdings.portfolio(user_id)?;
    similarity.ensure_compatible(features)?;

    let index = similarity.index();
    let mut held_positions = Vec::with_capacity(portfolio.len());
    for instrument_id in portfolio.keys() {
        match index.position(instrument_id) {
            Some(pos) => held_positions.push(pos),
            None => {
                tracing::warn!(%user_id, %instrument_id, "held instrument not in universe; ignored")
            }
        }
    }

    if held_positions.is_empty() {
        tracing::debug!(%user_id, "no holdings inside the universe; nothing to compare against");
        return Ok(Vec::new());
    }

    let held: BTreeSet<usize> = held_positions.iter().copied().collect();
    let mut scores = vec![0.0_f64; index.len()];
    for &pos in &held {
        for (candidate, sim) in similarity.row(pos).iter().enumerate() {
            if !held.contains(&candidate) {
                scores[candidate] += sim;
            }
        }
    }

    let mut candidates: Vec<(usize, f64)> = (0..index.len())
        .filter(|pos| !held.contains(pos))
        .map(|pos| (pos, scores[pos]))
        .collect();
    candidates.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| index.ids()[a.0].cmp(&index.ids()[b.0]))
    });

    // `ensure_compatible` guarantees vectors and matrix share positions.
    let out: Vec<Recommendation> = candidates
        .into_iter()
        .take(n)
        .map(|(pos, score)| {
            let vector = &features.vectors()[pos];
            Recommendation {
                instrument_id: vector.instrument_id.clone(),
                sector: vector.sector.clone(),
                basis: RecommendationBasis::HoldingsSimilarity { score },
            }
        })
        .collect();

    tracing::debug!(%user_id, held = held.len(), returned = out.len(), "holdings recommendations");
    Ok(out)
}

/// Recommends the leading instruments of the top trending sectors for `timeframe`.
///
/// Each sector contributes `max(1, n / sectors)` instruments, ranked by the sector-momentum
/// feature when the vectors carry one and by input order otherwise; the list is cut to `n`.
pub fn get_sector_based_recommendations(
    analysis: &SectorAnalysis,
    features: &FeatureVectors,
    n: usize,
    timeframe: &str,
    options: &SectorTrendOptions,
) -> Result<Vec<Recommendation>> {
    let trending = analysis.get_trending_sectors(timeframe, options.trending_sectors)?;
    if n == 0 || trending.is_empty() {
        return Ok(Vec::new());
    }

    let per_sector = (n / trending.len()).max(1);
    let members: Vec<Vec<&FeatureVector>> = trending
        .iter()
        .map(|m| sector_members(features, &m.sector))
        .collect();

    let mut out = Vec::with_capacity(n);
    for (metrics, members) in trending.iter().zip(&members) {
        for vector in members.iter().take(per_sector) {
            out.push(sector_recommendation(vector, metrics));
        }
    }

    if options.backfill && out.len() < n {
        'fill: for (metrics, members) in trending.iter().zip(&members) {
            for vector in members.iter().skip(per_sector) {
                if out.len() >= n {
                    break 'fill;
                }
                out.push(sector_recommendation(vector, metrics));
            }
        }
    }

    out.truncate(n);
    tracing::debug!(
        %timeframe,
        sectors = trending.len(),
        per_sector,
        returned = out.len(),
        "sector recommendations"
    );
    Ok(out)
}

fn sector_members<'a>(features: &'a FeatureVectors, sector: &str) -> Vec<&'a FeatureVector> {
    let mut members: Vec<&FeatureVector> = features
        .vectors()
        .iter()
        .filter(|v| v.sector == sector)
        .collect();
    if features.layout().momentum_column().is_some() {
        // Stable: equal momentum keeps input order.
        members.sort_by(|a, b| {
            let ma = features.sector_momentum(a).unwrap_or(0.0);
            let mb = features.sector_momentum(b).unwrap_or(0.0);
            mb.total_cmp(&ma)
        });
    }
    members
}

fn sector_recommendation(vector: &FeatureVector, metrics: &SectorMetrics) -> Recommendation {
    Recommendation {
        instrument_id: vector.instrument_id.clone(),
        sector: vector.sector.clone(),
        basis: RecommendationBasis::SectorTrend {
            sector_metrics: metrics.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{Holding, Instrument, Portfolio};
    use crate::domain::recommendation::Strategy;
    use crate::error::RecommenderError;
    use crate::features::encode_features;
    use crate::sectors::analyze_sectors;
    use crate::sectors::tests::{series, trending_returns};
    use crate::similarity::build_similarity;
    use crate::time::Window;
    use chrono::NaiveDate;

    fn inst(id: &str, sector: &str, market_cap: f64) -> Instrument {
        Instrument {
            instrument_id: id.to_string(),
            sector: sector.to_string(),
            market_cap,
            pe_ratio: 20.0,
            dividend_yield: 1.0,
            volatility: 0.2,
            beta: 1.0,
        }
    }

    fn holdings_of(user: &str, ids: &[&str]) -> UserHoldings {
        let portfolio: Portfolio = ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    Holding {
                        quantity: 10.0,
                        purchase_price: 100.0,
                    },
                )
            })
            .collect();
        let mut holdings = UserHoldings::new();
        holdings.register(user, portfolio);
        holdings
    }

    #[test]
    fn prefers_same_sector_close_profile() {
        let instruments = vec![
            inst("A", "Tech", 100.0),
            inst("B", "Tech", 110.0),
            inst("C", "Energy", 50.0),
        ];
        let fv = encode_features(&instruments, None).unwrap();
        let sim = build_similarity(&fv).unwrap();
        let holdings = holdings_of("user1", &["A"]);

        let recs = get_recommendations(&holdings, &fv, &sim, "user1", 2).unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(recs[0].sector, "Tech");
        assert_eq!(recs[0].strategy(), Strategy::HoldingsSimilarity);
        assert!(recs[0].similarity_score().unwrap() > recs[1].similarity_score().unwrap());
    }

    #[test]
    fn scores_accumulate_across_holdings() {
        let instruments = vec![
            inst("A", "Tech", 100.0),
            inst("B", "Tech", 105.0),
            inst("C", "Tech", 110.0),
            inst("D", "Energy", 50.0),
        ];
        let fv = encode_features(&instruments, None).unwrap();
        let sim = build_similarity(&fv).unwrap();
        let holdings = holdings_of("u", &["A", "B"]);

        let recs = get_recommendations(&holdings, &fv, &sim, "u", 5).unwrap();
        let expected_c = sim.similarity("A", "C").unwrap() + sim.similarity("B", "C").unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].instrument_id, "C");
        assert!((recs[0].similarity_score().unwrap() - expected_c).abs() < 1e-12);
    }

    #[test]
    fn never_recommends_held_instruments_and_handles_full_universe() {
        let instruments = vec![inst("A", "Tech", 100.0), inst("B", "Energy", 50.0)];
        let fv = encode_features(&instruments, None).unwrap();
        let sim = build_similarity(&fv).unwrap();

        let all = holdings_of("u", &["A", "B"]);
        assert!(get_recommendations(&all, &fv, &sim, "u", 3).unwrap().is_empty());

        let outside = holdings_of("u", &["ZZZ"]);
        assert!(get_recommendations(&outside, &fv, &sim, "u", 3)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn ties_break_on_instrument_id() {
        let instruments = vec![
            inst("A", "Tech", 100.0),
            inst("Z", "Energy", 100.0),
            inst("M", "Energy", 100.0),
        ];
        let fv = encode_features(&instruments, None).unwrap();
        let sim = build_similarity(&fv).unwrap();
        let holdings = holdings_of("u", &["A"]);

        let recs = get_recommendations(&holdings, &fv, &sim, "u", 2).unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["M", "Z"]);
    }

    #[test]
    fn unknown_user_and_stale_matrix_are_errors() {
        let instruments = vec![inst("A", "Tech", 100.0), inst("B", "Energy", 50.0)];
        let fv = encode_features(&instruments, None).unwrap();
        let sim = build_similarity(&fv).unwrap();
        let holdings = holdings_of("u", &["A"]);

        assert_eq!(
            get_recommendations(&holdings, &fv, &sim, "nobody", 1).unwrap_err(),
            RecommenderError::UserNotFound("nobody".to_string())
        );

        let other = encode_features(&instruments[..1], None).unwrap();
        assert!(matches!(
            get_recommendations(&holdings, &other, &sim, "u", 1),
            Err(RecommenderError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn matrix_from_another_universe_of_equal_width_is_rejected() {
        let stale = encode_features(
            &[inst("X", "Tech", 100.0), inst("Y", "Tech", 110.0), inst("Z", "Energy", 50.0)],
            None,
        )
        .unwrap();
        let sim = build_similarity(&stale).unwrap();
        let fresh = encode_features(
            &[inst("A", "Tech", 100.0), inst("B", "Tech", 110.0), inst("C", "Energy", 50.0)],
            None,
        )
        .unwrap();
        let holdings = holdings_of("u", &["X"]);

        assert!(matches!(
            get_recommendations(&holdings, &fresh, &sim, "u", 2),
            Err(RecommenderError::StaleSimilarity { position: 0, .. })
        ));
    }

    fn trend_fixture() -> (SectorAnalysis, FeatureVectors) {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut data = series("XLK", "Tech", start, &trending_returns(0.10, 0.02, 30));
        data.extend(series("XLE", "Energy", start, &trending_returns(0.03, 0.02, 30)));
        data.extend(series("XLU", "Utilities", start, &trending_returns(-0.08, 0.02, 30)));
        let analysis = analyze_sectors(&data, &Window::defaults()).unwrap();

        let instruments = vec![
            inst("AAPL", "Tech", 2000.0),
            inst("MSFT", "Tech", 1800.0),
            inst("NVDA", "Tech", 1500.0),
            inst("XOM", "Energy", 400.0),
            inst("NEE", "Utilities", 150.0),
            inst("DUK", "Utilities", 80.0),
        ];
        let scores = analysis.momentum_scores("month").unwrap();
        let fv = encode_features(&instruments, Some(&scores)).unwrap();
        (analysis, fv)
    }

    #[test]
    fn sector_recommendations_follow_trending_order() {
        let (analysis, fv) = trend_fixture();
        let options = SectorTrendOptions {
            trending_sectors: 2,
            backfill: false,
        };

        let recs = get_sector_based_recommendations(&analysis, &fv, 4, "month", &options).unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.instrument_id.as_str()).collect();
        // Two sectors x two slots; Energy has a single member so the list comes up short.
        assert_eq!(ids, vec!["AAPL", "MSFT", "XOM"]);

        let metrics = recs[0].sector_metrics().unwrap();
        assert_eq!(metrics.sector, "Tech");
        assert_eq!(metrics.rank, 1);
        assert_eq!(recs[2].sector_metrics().unwrap().rank, 2);
        assert_eq!(recs[2].strategy(), Strategy::SectorTrend);
    }

    #[test]
    fn backfill_tops_up_from_trending_sectors_in_rank_order() {
        let (analysis, fv) = trend_fixture();
        let options = SectorTrendOptions {
            trending_sectors: 2,
            backfill: true,
        };

        let recs = get_sector_based_recommendations(&analysis, &fv, 4, "month", &options).unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["AAPL", "MSFT", "XOM", "NVDA"]);
    }

    #[test]
    fn each_sector_gets_at_least_one_slot_and_output_is_truncated() {
        let (analysis, fv) = trend_fixture();
        let recs = get_sector_based_recommendations(
            &analysis,
            &fv,
            2,
            "month",
            &SectorTrendOptions::default(),
        )
        .unwrap();
        // 2 / 3 sectors rounds down to zero; every sector still contributes one before truncation.
        let ids: Vec<&str> = recs.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["AAPL", "XOM"]);

        assert!(get_sector_based_recommendations(
            &analysis,
            &fv,
            0,
            "month",
            &SectorTrendOptions::default()
        )
        .unwrap()
        .is_empty());
    }

    #[test]
    fn sector_recommendations_reject_unknown_timeframe() {
        let (analysis, fv) = trend_fixture();
        assert!(matches!(
            get_sector_based_recommendations(
                &analysis,
                &fv,
                3,
                "decade",
                &SectorTrendOptions::default()
            ),
            Err(RecommenderError::InvalidTimeframe { .. })
        ));
    }
}
