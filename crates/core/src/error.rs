use thiserror::Error;

pub type Result<T, E = RecommenderError> = std::result::Result<T, E>;

/// Deterministic failures of the recommendation computations.
///
/// None of these are retried: the same inputs always produce the same error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecommenderError {
    #[error("user holdings not found: {0}")]
    UserNotFound(String),

    /// A feature vector does not have the width of the encoding it claims to belong to. This means
    /// the vectors came from a different instrument universe than the one being compared.
    #[error(
        "feature vector dimension mismatch for {instrument_id}: expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        instrument_id: String,
        expected: usize,
        actual: usize,
    },

    /// The similarity matrix was built from a different instrument collection than the feature
    /// vectors it is being used with.
    #[error("similarity matrix is stale: expected instrument {expected:?} at position {position}, found {actual:?}")]
    StaleSimilarity {
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("invalid timeframe {requested:?}; choose from {available:?}")]
    InvalidTimeframe {
        requested: String,
        available: Vec<String>,
    },

    #[error("insufficient data for {context}: need at least {required} observations, got {actual}")]
    InsufficientData {
        context: String,
        required: usize,
        actual: usize,
    },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("duplicate instrument id: {0}")]
    DuplicateInstrument(String),

    #[error("instrument {instrument_id} has a non-finite {attribute}")]
    NonFiniteAttribute {
        instrument_id: String,
        attribute: &'static str,
    },
}

impl RecommenderError {
    pub(crate) fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required,
            actual,
        }
    }
}
