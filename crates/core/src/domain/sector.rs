use crate::domain::metric::MetricResult;
use serde::{Deserialize, Serialize};

/// Aggregated performance of one sector over one look-back window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorMetrics {
    pub sector: String,
    pub window: String,
    /// 1 = strongest momentum in the window.
    pub rank: usize,
    pub cumulative_return: MetricResult,
    pub volatility: MetricResult,
    pub volume_change: MetricResult,
    pub momentum_score: MetricResult,
    /// Number of in-window periodic returns the metrics were computed from.
    pub observations: usize,
}
