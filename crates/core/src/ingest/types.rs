use crate::domain::instrument::MarketDataPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Price history of one symbol as returned by the market-data feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: String,
    pub bars: Vec<PriceBar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub adj_close: Option<f64>,
    pub volume: f64,
}

impl PriceBar {
    /// Adjusted close when the feed supplies one.
    pub fn price(&self) -> f64 {
        self.adj_close.unwrap_or(self.close)
    }
}

impl PriceSeries {
    /// Observations attributed to `sector`, one per bar with a usable price.
    pub fn into_market_data(self, sector: &str) -> Vec<MarketDataPoint> {
        let symbol = self.symbol;
        self.bars
            .into_iter()
            .filter(|b| b.price().is_finite() && b.price() > 0.0)
            .map(|b| MarketDataPoint {
                date: b.date,
                instrument_id: symbol.clone(),
                sector: sector.to_string(),
                price: b.price(),
                volume: if b.volume.is_finite() { b.volume.max(0.0) } else { 0.0 },
            })
            .collect()
    }
}
