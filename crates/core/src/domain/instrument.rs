use crate::error::{RecommenderError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: String,
    pub sector: String,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub dividend_yield: f64,
    pub volatility: f64,
    pub beta: f64,
}

impl Instrument {
    /// Numeric attributes in encoding order, paired with their names.
    pub fn numeric_attributes(&self) -> [(&'static str, f64); 5] {
        [
            ("market_cap", self.market_cap),
            ("pe_ratio", self.pe_ratio),
            ("dividend_yield", self.dividend_yield),
            ("volatility", self.volatility),
            ("beta", self.beta),
        ]
    }

    pub fn ensure_finite(&self) -> Result<()> {
        for (attribute, value) in self.numeric_attributes() {
            if !value.is_finite() {
                return Err(RecommenderError::NonFiniteAttribute {
                    instrument_id: self.instrument_id.clone(),
                    attribute,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: f64,
    pub purchase_price: f64,
}

pub type Portfolio = BTreeMap<String, Holding>;

/// Registered holdings keyed by user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHoldings {
    users: BTreeMap<String, Portfolio>,
}

impl UserHoldings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the holdings of `user_id`.
    pub fn register(&mut self, user_id: impl Into<String>, portfolio: Portfolio) {
        self.users.insert(user_id.into(), portfolio);
    }

    pub fn portfolio(&self, user_id: &str) -> Result<&Portfolio> {
        self.users
            .get(user_id)
            .ok_or_else(|| RecommenderError::UserNotFound(user_id.to_string()))
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<(String, Portfolio)> for UserHoldings {
    fn from_iter<T: IntoIterator<Item = (String, Portfolio)>>(iter: T) -> Self {
        Self {
            users: iter.into_iter().collect(),
        }
    }
}

/// One observation of an instrument's price and traded volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub date: NaiveDate,
    pub instrument_id: String,
    pub sector: String,
    pub price: f64,
    pub volume: f64,
}
