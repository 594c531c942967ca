use crate::domain::instrument::MarketDataPoint;
use crate::ingest::provider::MarketDataFeed;
use anyhow::Result;

/// SPDR sector ETFs used as sector proxies.
pub const SECTOR_ETFS: [(&str, &str); 11] = [
    ("Technology", "XLK"),
    ("Financial", "XLF"),
    ("Healthcare", "XLV"),
    ("Consumer Discretionary", "XLY"),
    ("Consumer Staples", "XLP"),
    ("Energy", "XLE"),
    ("Materials", "XLB"),
    ("Industrial", "XLI"),
    ("Utilities", "XLU"),
    ("Real Estate", "XLRE"),
    ("Communication Services", "XLC"),
];

pub fn etf_for_sector(sector: &str) -> Option<&'static str> {
    SECTOR_ETFS
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(sector))
        .map(|(_, etf)| *etf)
}

/// Fetches every sector ETF and returns their observations tagged with the sector.
///
/// A failed ETF is skipped with a warning; the call fails only if none could be fetched.
pub async fn fetch_sector_market_data(
    feed: &dyn MarketDataFeed,
    period: &str,
    interval: &str,
) -> Result<Vec<MarketDataPoint>> {
    let mut out = Vec::new();
    let mut fetched = 0usize;

    for (sector, etf) in SECTOR_ETFS {
        match feed.fetch(etf, period, interval).await {
            Ok(series) => {
                let points = series.into_market_data(sector);
                tracing::debug!(%sector, %etf, bars = points.len(), "fetched sector ETF history");
                fetched += 1;
                out.extend(points);
            }
            Err(err) => {
                tracing::warn!(%sector, %etf, provider = feed.provider_name(), error = %err, "sector ETF fetch failed; skipped");
            }
        }
    }

    anyhow::ensure!(
        fetched > 0,
        "no sector ETF history could be fetched from {}",
        feed.provider_name()
    );
    Ok(out)
}
