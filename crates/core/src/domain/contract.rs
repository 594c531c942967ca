use crate::domain::instrument::{Holding, Instrument, MarketDataPoint, Portfolio, UserHoldings};
use anyhow::{ensure, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Instrument record as supplied by the instrument feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub instrument_id: String,
    pub sector: String,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub dividend_yield: f64,
    pub volatility: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub quantity: f64,
    pub purchase_price: f64,
}

/// `{user_id -> {instrument_id -> holding}}` as supplied by the holdings feed.
pub type HoldingsDocument = BTreeMap<String, BTreeMap<String, HoldingRecord>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataRecord {
    pub date: NaiveDate,
    pub instrument_id: String,
    pub sector: String,
    pub price: f64,
    pub volume: f64,
}

impl InstrumentRecord {
    pub fn validate_and_into_instrument(self) -> anyhow::Result<Instrument> {
        let instrument_id = self.instrument_id.trim().to_string();
        ensure!(!instrument_id.is_empty(), "instrument_id must be non-empty");

        let sector = self.sector.trim().to_string();
        ensure!(
            !sector.is_empty(),
            "sector must be non-empty (instrument {instrument_id})"
        );

        let instrument = Instrument {
            instrument_id,
            sector,
            market_cap: self.market_cap,
            pe_ratio: self.pe_ratio,
            dividend_yield: self.dividend_yield,
            volatility: self.volatility,
            beta: self.beta,
        };
        instrument.ensure_finite()?;
        Ok(instrument)
    }
}

impl HoldingRecord {
    fn validate_and_into_holding(self, instrument_id: &str) -> anyhow::Result<Holding> {
        ensure!(
            self.quantity.is_finite() && self.quantity > 0.0,
            "quantity must be positive (instrument {instrument_id}, got {})",
            self.quantity
        );
        ensure!(
            self.purchase_price.is_finite() && self.purchase_price > 0.0,
            "purchase_price must be positive (instrument {instrument_id}, got {})",
            self.purchase_price
        );
        Ok(Holding {
            quantity: self.quantity,
            purchase_price: self.purchase_price,
        })
    }
}

impl MarketDataRecord {
    pub fn validate_and_into_point(self) -> anyhow::Result<MarketDataPoint> {
        let instrument_id = self.instrument_id.trim().to_string();
        ensure!(!instrument_id.is_empty(), "instrument_id must be non-empty");

        let sector = self.sector.trim().to_string();
        ensure!(
            !sector.is_empty(),
            "sector must be non-empty ({instrument_id} on {})",
            self.date
        );
        ensure!(
            self.price.is_finite() && self.price > 0.0,
            "price must be positive ({instrument_id} on {}, got {})",
            self.date,
            self.price
        );
        ensure!(
            self.volume.is_finite() && self.volume >= 0.0,
            "volume must be non-negative ({instrument_id} on {}, got {})",
            self.date,
            self.volume
        );

        Ok(MarketDataPoint {
            date: self.date,
            instrument_id,
            sector,
            price: self.price,
            volume: self.volume,
        })
    }
}

/// Validates every record and rejects duplicate instrument ids.
pub fn validate_instruments(records: Vec<InstrumentRecord>) -> anyhow::Result<Vec<Instrument>> {
    let mut seen = BTreeSet::<String>::new();
    let mut out = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let instrument = record
            .validate_and_into_instrument()
            .with_context(|| format!("invalid instrument record #{idx}"))?;
        ensure!(
            seen.insert(instrument.instrument_id.clone()),
            "duplicate instrument_id: {}",
            instrument.instrument_id
        );
        out.push(instrument);
    }
    Ok(out)
}

pub fn validate_holdings(doc: HoldingsDocument) -> anyhow::Result<UserHoldings> {
    let mut out = UserHoldings::new();
    for (user_id, records) in doc {
        let user_id = user_id.trim().to_string();
        ensure!(!user_id.is_empty(), "user_id must be non-empty");

        let mut portfolio = Portfolio::new();
        for (instrument_id, record) in records {
            let instrument_id = instrument_id.trim().to_string();
            ensure!(
                !instrument_id.is_empty(),
                "instrument_id must be non-empty (user {user_id})"
            );
            let holding = record
                .validate_and_into_holding(&instrument_id)
                .with_context(|| format!("invalid holding for user {user_id}"))?;
            portfolio.insert(instrument_id, holding);
        }
        out.register(user_id, portfolio);
    }
    Ok(out)
}

pub fn validate_market_data(records: Vec<MarketDataRecord>) -> anyhow::Result<Vec<MarketDataPoint>> {
    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            record
                .validate_and_into_point()
                .with_context(|| format!("invalid market data record #{idx}"))
        })
        .collect()
}
