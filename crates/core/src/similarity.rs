use crate::error::{RecommenderError, Result};
use crate::features::FeatureVectors;
use serde::Serialize;
use std::collections::HashMap;

/// Bidirectional mapping between instrument ids and matrix positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstrumentIndex {
    ids: Vec<String>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl InstrumentIndex {
    fn from_ids(ids: Vec<String>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(ids.len());
        for (pos, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), pos).is_some() {
                return Err(RecommenderError::DuplicateInstrument(id.clone()));
            }
        }
        Ok(Self { ids, positions })
    }

    pub fn position(&self, instrument_id: &str) -> Option<usize> {
        self.positions.get(instrument_id).copied()
    }

    pub fn id(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    pub fn contains(&self, instrument_id: &str) -> bool {
        self.positions.contains_key(instrument_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Square, symmetric cosine-similarity matrix with a unit diagonal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatrix {
    index: InstrumentIndex,
    dimension: usize,
    /// Row-major, `n * n`.
    values: Vec<f64>,
}

impl SimilarityMatrix {
    pub fn index(&self) -> &InstrumentIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Width of the feature vectors the matrix was built from.
    pub fn feature_dimension(&self) -> usize {
        self.dimension
    }

    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.len() + col]
    }

    pub fn row(&self, position: usize) -> &[f64] {
        let n = self.len();
        &self.values[position * n..(position + 1) * n]
    }

    pub fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        let row = self.require_position(a)?;
        let col = self.require_position(b)?;
        Ok(self.at(row, col))
    }

    pub fn require_position(&self, instrument_id: &str) -> Result<usize> {
        self.index
            .position(instrument_id)
            .ok_or_else(|| RecommenderError::UnknownInstrument(instrument_id.to_string()))
    }

    /// Fails with `DimensionMismatch` when `vectors` were not encoded with the layout this
    /// matrix was built from, and with `StaleSimilarity` when they describe a different
    /// instrument collection or order.
    pub fn ensure_compatible(&self, vectors: &FeatureVectors) -> Result<()> {
        let actual = vectors.layout().dimension();
        if actual != self.dimension {
            return Err(RecommenderError::DimensionMismatch {
                instrument_id: vectors
                    .vectors()
                    .first()
                    .map(|v| v.instrument_id.clone())
                    .unwrap_or_default(),
                expected: self.dimension,
                actual,
            });
        }

        let ids = self.index.ids();
        let len = ids.len().max(vectors.len());
        for position in 0..len {
            let expected = ids.get(position).map(String::as_str).unwrap_or_default();
            let actual = vectors
                .vectors()
                .get(position)
                .map(|v| v.instrument_id.as_str())
                .unwrap_or_default();
            if expected != actual {
                return Err(RecommenderError::StaleSimilarity {
                    position,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Cosine similarity between every pair of vectors.
///
/// Pairs involving an all-zero vector score 0.0; the diagonal is exactly 1.0 regardless.
pub fn build_similarity(vectors: &FeatureVectors) -> Result<SimilarityMatrix> {
    let t0 = std::time::Instant::now();
    let dimension = vectors.layout().dimension();

    for v in vectors.vectors() {
        if v.values.len() != dimension {
            return Err(RecommenderError::DimensionMismatch {
                instrument_id: v.instrument_id.clone(),
                expected: dimension,
                actual: v.values.len(),
            });
        }
    }

    let index = InstrumentIndex::from_ids(
        vectors
            .vectors()
            .iter()
            .map(|v| v.instrument_id.clone())
            .collect(),
    )?;

    let n = vectors.len();
    let norms: Vec<f64> = vectors
        .vectors()
        .iter()
        .map(|v| dot(&v.values, &v.values).sqrt())
        .collect();

    let mut values = vec![0.0; n * n];
    for i in 0..n {
        values[i * n + i] = 1.0;
        for j in (i + 1)..n {
            let denom = norms[i] * norms[j];
            let sim = if denom > 0.0 && denom.is_finite() {
                let raw = dot(&vectors.vectors()[i].values, &vectors.vectors()[j].values) / denom;
                if raw.is_finite() {
                    raw.clamp(-1.0, 1.0)
                } else {
                    0.0
                }
            } else {
                0.0
            };
            values[i * n + j] = sim;
            values[j * n + i] = sim;
        }
    }

    tracing::debug!(
        instruments = n,
        dimension,
        elapsed_ms = t0.elapsed().as_millis(),
        "built similarity matrix"
    );

    Ok(SimilarityMatrix {
        index,
        dimension,
        values,
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::Instrument;
    use crate::features::{encode_features, FeatureVector};

    fn instruments() -> Vec<Instrument> {
        let rows = [
            ("AAPL", "Technology", 2000.0, 25.0, 0.5, 0.2, 1.1),
            ("GOOGL", "Technology", 1500.0, 28.0, 0.0, 0.25, 1.2),
            ("AMZN", "Consumer", 1600.0, 70.0, 0.0, 0.3, 1.3),
            ("TSLA", "Automotive", 700.0, 100.0, 0.0, 0.5, 1.8),
        ];
        rows.iter()
            .map(|(id, sector, mc, pe, dy, vol, beta)| Instrument {
                instrument_id: id.to_string(),
                sector: sector.to_string(),
                market_cap: *mc,
                pe_ratio: *pe,
                dividend_yield: *dy,
                volatility: *vol,
                beta: *beta,
            })
            .collect()
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let fv = encode_features(&instruments(), None).unwrap();
        let m = build_similarity(&fv).unwrap();

        assert_eq!(m.len(), 4);
        for i in 0..m.len() {
            assert_eq!(m.at(i, i), 1.0);
            for j in 0..m.len() {
                assert_eq!(m.at(i, j), m.at(j, i));
                assert!((-1.0..=1.0).contains(&m.at(i, j)));
            }
        }
    }

    #[test]
    fn index_maps_ids_both_ways() {
        let fv = encode_features(&instruments(), None).unwrap();
        let m = build_similarity(&fv).unwrap();

        let pos = m.index().position("AMZN").unwrap();
        assert_eq!(pos, 2);
        assert_eq!(m.index().id(pos), Some("AMZN"));
        assert_eq!(m.index().position("NFLX"), None);
        assert_eq!(
            m.similarity("AAPL", "NFLX").unwrap_err(),
            RecommenderError::UnknownInstrument("NFLX".to_string())
        );
    }

    #[test]
    fn same_sector_peers_are_closer_than_other_sectors() {
        let fv = encode_features(&instruments(), None).unwrap();
        let m = build_similarity(&fv).unwrap();
        let peer = m.similarity("AAPL", "GOOGL").unwrap();
        let other = m.similarity("AAPL", "TSLA").unwrap();
        assert!(peer > other, "peer={peer} other={other}");
    }

    #[test]
    fn rejects_vectors_of_inconsistent_width() {
        let fv = encode_features(&instruments(), None).unwrap();
        let mut vectors = fv.vectors().to_vec();
        vectors.push(FeatureVector {
            instrument_id: "STALE".to_string(),
            sector: "Technology".to_string(),
            values: vec![0.0; 3],
        });
        let stale = FeatureVectors::from_parts(fv.layout().clone(), vectors);

        assert_eq!(
            build_similarity(&stale).unwrap_err(),
            RecommenderError::DimensionMismatch {
                instrument_id: "STALE".to_string(),
                expected: fv.layout().dimension(),
                actual: 3,
            }
        );
    }

    #[test]
    fn ensure_compatible_detects_a_different_universe() {
        let fv = encode_features(&instruments(), None).unwrap();
        let m = build_similarity(&fv).unwrap();

        let smaller = encode_features(&instruments()[..2], None).unwrap();
        assert!(matches!(
            m.ensure_compatible(&smaller),
            Err(RecommenderError::DimensionMismatch { .. })
        ));
        assert!(m.ensure_compatible(&fv).is_ok());
    }

    #[test]
    fn same_width_vectors_from_another_universe_are_stale() {
        let fv = encode_features(&instruments(), None).unwrap();
        let m = build_similarity(&fv).unwrap();

        let mut renamed = instruments();
        renamed[1].instrument_id = "MSFT".to_string();
        let other = encode_features(&renamed, None).unwrap();
        assert_eq!(other.layout().dimension(), fv.layout().dimension());

        assert_eq!(
            m.ensure_compatible(&other).unwrap_err(),
            RecommenderError::StaleSimilarity {
                position: 1,
                expected: "GOOGL".to_string(),
                actual: "MSFT".to_string(),
            }
        );
    }

    #[test]
    fn rebuilding_is_deterministic() {
        let fv = encode_features(&instruments(), None).unwrap();
        assert_eq!(build_similarity(&fv).unwrap(), build_similarity(&fv).unwrap());
    }

    #[test]
    fn zero_vectors_score_zero_off_the_diagonal() {
        let fv = encode_features(&instruments(), None).unwrap();
        let layout = fv.layout().clone();
        let dim = layout.dimension();
        let zeroed = FeatureVectors::from_parts(
            layout,
            vec![
                FeatureVector {
                    instrument_id: "Z".to_string(),
                    sector: "Technology".to_string(),
                    values: vec![0.0; dim],
                },
                fv.vectors()[0].clone(),
            ],
        );
        let m = build_similarity(&zeroed).unwrap();
        assert_eq!(m.at(0, 0), 1.0);
        assert_eq!(m.at(0, 1), 0.0);
    }
}
