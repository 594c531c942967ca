use crate::domain::sector::SectorMetrics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    HoldingsSimilarity,
    SectorTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub instrument_id: String,
    pub sector: String,
    pub basis: RecommendationBasis,
}

/// What produced a recommendation, with the numbers needed to explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RecommendationBasis {
    /// Summed similarity to every held instrument.
    HoldingsSimilarity { score: f64 },
    SectorTrend { sector_metrics: SectorMetrics },
}

impl Recommendation {
    pub fn strategy(&self) -> Strategy {
        match self.basis {
            RecommendationBasis::HoldingsSimilarity { .. } => Strategy::HoldingsSimilarity,
            RecommendationBasis::SectorTrend { .. } => Strategy::SectorTrend,
        }
    }

    pub fn similarity_score(&self) -> Option<f64> {
        match self.basis {
            RecommendationBasis::HoldingsSimilarity { score } => Some(score),
            RecommendationBasis::SectorTrend { .. } => None,
        }
    }

    pub fn sector_metrics(&self) -> Option<&SectorMetrics> {
        match &self.basis {
            RecommendationBasis::HoldingsSimilarity { .. } => None,
            RecommendationBasis::SectorTrend { sector_metrics } => Some(sector_metrics),
        }
    }
}

/// A held instrument that justifies a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub held_instrument_id: String,
    pub similarity: f64,
}

impl Explanation {
    pub fn describe(&self) -> String {
        format!(
            "Similar to your holding {} (similarity: {:.2})",
            self.held_instrument_id, self.similarity
        )
    }
}
