use crate::domain::contract::{
    validate_holdings, validate_instruments, validate_market_data, HoldingsDocument,
    InstrumentRecord, MarketDataRecord,
};
use crate::domain::instrument::{Instrument, MarketDataPoint, UserHoldings};
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Reads a JSON array of instrument records.
pub fn load_instruments(path: &Path) -> anyhow::Result<Vec<Instrument>> {
    let records: Vec<InstrumentRecord> = read_json(path)?;
    validate_instruments(records).with_context(|| format!("invalid instruments in {}", path.display()))
}

/// Reads a `{user_id: {instrument_id: {quantity, purchase_price}}}` document.
pub fn load_holdings(path: &Path) -> anyhow::Result<UserHoldings> {
    let doc: HoldingsDocument = read_json(path)?;
    validate_holdings(doc).with_context(|| format!("invalid holdings in {}", path.display()))
}

/// Reads a JSON array of market data records.
pub fn load_market_data(path: &Path) -> anyhow::Result<Vec<MarketDataPoint>> {
    let records: Vec<MarketDataRecord> = read_json(path)?;
    validate_market_data(records)
        .with_context(|| format!("invalid market data in {}", path.display()))
}
