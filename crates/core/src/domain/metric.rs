use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Why a statistic could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Fewer observations than the statistic needs.
    InsufficientData,
    /// Volatility of exactly zero; a risk-adjusted ratio is meaningless.
    ZeroVolatility,
    /// An intermediate value overflowed or otherwise left the finite range.
    NonFinite,
}

/// A statistic that is either a finite number or explicitly undefined.
///
/// `Computed` never holds NaN or an infinity, so ordering computed values is total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricResult {
    Computed(f64),
    Undefined(UndefinedReason),
}

impl MetricResult {
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Self::Computed(value)
        } else {
            Self::Undefined(UndefinedReason::NonFinite)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Computed(v) => Some(*v),
            Self::Undefined(_) => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// Applies `f` to a computed value; the result is re-checked for finiteness.
    pub fn and_then(self, f: impl FnOnce(f64) -> MetricResult) -> Self {
        match self {
            Self::Computed(v) => match f(v) {
                Self::Computed(out) => Self::from_value(out),
                undefined => undefined,
            },
            undefined => undefined,
        }
    }

    /// Descending order for ranking: larger computed values first, undefined values last.
    pub fn cmp_desc(&self, other: &Self) -> Ordering {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => b.total_cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for MetricResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computed(v) => write!(f, "{v:.6}"),
            Self::Undefined(reason) => write!(f, "undefined ({reason:?})"),
        }
    }
}
