use crate::universe;
use anyhow::Context;
use chrono::NaiveDate;
use finrec_core::config::Settings;
use finrec_core::domain::instrument::{Instrument, MarketDataPoint, UserHoldings};
use finrec_core::ingest::files;
use finrec_core::ingest::provider::HttpJsonMarketDataFeed;
use finrec_core::ingest::sector_etfs::fetch_sector_market_data;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Inputs {
    pub instruments: Vec<Instrument>,
    pub holdings: UserHoldings,
    pub market_data: Vec<MarketDataPoint>,
}

#[derive(Debug, Clone)]
pub enum MarketSource {
    None,
    File(PathBuf),
    SectorEtfs { period: String, interval: String },
}

pub fn load_demo(as_of_date: NaiveDate) -> anyhow::Result<Inputs> {
    let opts = universe::DemoOptions::from_env(as_of_date);
    Ok(Inputs {
        instruments: universe::demo_instruments(),
        holdings: universe::demo_holdings(),
        market_data: universe::demo_market_data(&opts)?,
    })
}

pub async fn load_inputs(
    settings: &Settings,
    instruments_path: Option<PathBuf>,
    holdings_path: Option<PathBuf>,
    market: MarketSource,
) -> anyhow::Result<Inputs> {
    let instruments_path = match instruments_path {
        Some(p) => p,
        None => settings.require_instruments_path()?.clone(),
    };
    let holdings_path = match holdings_path {
        Some(p) => p,
        None => settings.require_holdings_path()?.clone(),
    };

    let instruments = files::load_instruments(&instruments_path)?;
    let holdings = files::load_holdings(&holdings_path)?;

    let market_data = match market {
        MarketSource::None => Vec::new(),
        MarketSource::File(path) => files::load_market_data(&path)?,
        MarketSource::SectorEtfs { period, interval } => {
            let feed = HttpJsonMarketDataFeed::from_settings(settings)?;
            fetch_sector_market_data(&feed, &period, &interval)
                .await
                .context("sector ETF ingestion failed")?
        }
    };

    tracing::info!(
        instruments = instruments.len(),
        users = holdings.len(),
        market_points = market_data.len(),
        "loaded inputs"
    );

    Ok(Inputs {
        instruments,
        holdings,
        market_data,
    })
}
