//! Numeric encoding of instruments for similarity comparison.
//!
//! Column layout of every vector, in order:
//! 1. the five numeric attributes, min-max scaled over the encoded collection;
//! 2. `sector_momentum`, only when momentum scores were supplied;
//! 3. one column per distinct sector present (lexical order), one-hot.
//!
//! The layout depends on the collection, so vectors are only comparable with vectors produced by
//! the same call.

use crate::domain::instrument::Instrument;
use crate::error::{RecommenderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const NUMERIC_FEATURES: [&str; 5] = [
    "market_cap",
    "pe_ratio",
    "dividend_yield",
    "volatility",
    "beta",
];

pub const SECTOR_MOMENTUM_FEATURE: &str = "sector_momentum";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLayout {
    columns: Vec<String>,
    sectors: Vec<String>,
    momentum_column: Option<usize>,
}

impl FeatureLayout {
    fn new(sectors: Vec<String>, with_momentum: bool) -> Self {
        let mut columns: Vec<String> = NUMERIC_FEATURES.iter().map(|c| c.to_string()).collect();
        let momentum_column = if with_momentum {
            columns.push(SECTOR_MOMENTUM_FEATURE.to_string());
            Some(columns.len() - 1)
        } else {
            None
        };
        columns.extend(sectors.iter().cloned());

        Self {
            columns,
            sectors,
            momentum_column,
        }
    }

    pub fn dimension(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn sectors(&self) -> &[String] {
        &self.sectors
    }

    pub fn momentum_column(&self) -> Option<usize> {
        self.momentum_column
    }

    pub fn sector_column(&self, sector: &str) -> Option<usize> {
        let offset = NUMERIC_FEATURES.len() + usize::from(self.momentum_column.is_some());
        self.sectors
            .binary_search_by(|s| s.as_str().cmp(sector))
            .ok()
            .map(|i| offset + i)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub instrument_id: String,
    pub sector: String,
    pub values: Vec<f64>,
}

/// Feature vectors in the order of the instrument collection they were encoded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVectors {
    layout: FeatureLayout,
    vectors: Vec<FeatureVector>,
}

impl FeatureVectors {
    /// Pairs vectors produced elsewhere with a layout. Widths are not checked here; the
    /// similarity build rejects inconsistent vectors.
    pub fn from_parts(layout: FeatureLayout, vectors: Vec<FeatureVector>) -> Self {
        Self { layout, vectors }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, instrument_id: &str) -> Option<&FeatureVector> {
        self.vectors.iter().find(|v| v.instrument_id == instrument_id)
    }

    pub fn sector_momentum(&self, vector: &FeatureVector) -> Option<f64> {
        self.layout
            .momentum_column
            .and_then(|col| vector.values.get(col).copied())
    }
}

/// Encodes `instruments` into feature vectors, optionally appending the normalized momentum
/// score of each instrument's sector.
///
/// Attributes with zero variance across the collection encode as 0.0 for every instrument, as
/// does the momentum column for sectors absent from `sector_momentum`.
pub fn encode_features(
    instruments: &[Instrument],
    sector_momentum: Option<&BTreeMap<String, f64>>,
) -> Result<FeatureVectors> {
    let mut seen = HashSet::with_capacity(instruments.len());
    for inst in instruments {
        inst.ensure_finite()?;
        if !seen.insert(inst.instrument_id.as_str()) {
            return Err(RecommenderError::DuplicateInstrument(
                inst.instrument_id.clone(),
            ));
        }
    }

    let sectors: Vec<String> = instruments
        .iter()
        .map(|i| i.sector.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let layout = FeatureLayout::new(sectors, sector_momentum.is_some());

    let numeric_columns: Vec<Vec<f64>> = (0..NUMERIC_FEATURES.len())
        .map(|col| {
            let raw: Vec<f64> = instruments
                .iter()
                .map(|i| i.numeric_attributes()[col].1)
                .collect();
            min_max_scale(&raw)
        })
        .collect();

    let momentum_column = sector_momentum.map(|scores| {
        let raw: Vec<Option<f64>> = instruments
            .iter()
            .map(|i| scores.get(&i.sector).copied().filter(|v| v.is_finite()))
            .collect();
        min_max_scale_partial(&raw)
    });

    let vectors = instruments
        .iter()
        .enumerate()
        .map(|(row, inst)| {
            let mut values = Vec::with_capacity(layout.dimension());
            values.extend(numeric_columns.iter().map(|column| column[row]));
            if let Some(momentum) = &momentum_column {
                values.push(momentum[row]);
            }
            values.extend(
                layout
                    .sectors
                    .iter()
                    .map(|s| if *s == inst.sector { 1.0 } else { 0.0 }),
            );

            FeatureVector {
                instrument_id: inst.instrument_id.clone(),
                sector: inst.sector.clone(),
                values,
            }
        })
        .collect();

    tracing::debug!(
        instruments = instruments.len(),
        dimension = layout.dimension(),
        with_momentum = layout.momentum_column.is_some(),
        "encoded instrument features"
    );

    Ok(FeatureVectors { layout, vectors })
}

fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let present: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    min_max_scale_partial(&present)
}

/// Scales present values into [0, 1]; missing values and zero-range inputs map to 0.0.
fn min_max_scale_partial(values: &[Option<f64>]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let range = max - min;

    values
        .iter()
        .map(|v| match v {
            Some(v) if range.is_finite() && range > 0.0 => (v - min) / range,
            _ => 0.0,
        })
        .collect()
}
