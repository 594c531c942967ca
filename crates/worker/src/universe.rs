use chrono::{Duration, NaiveDate};
use finrec_core::domain::instrument::{
    Holding, Instrument, MarketDataPoint, Portfolio, UserHoldings,
};

#[derive(Debug, Clone)]
pub struct DemoOptions {
    /// Days of market history to synthesize, ending at `as_of_date`.
    pub days: usize,
    pub as_of_date: NaiveDate,
}

impl DemoOptions {
    pub fn new(as_of_date: NaiveDate) -> Self {
        Self {
            days: 90,
            as_of_date,
        }
    }

    pub fn from_env(as_of_date: NaiveDate) -> Self {
        let mut out = Self::new(as_of_date);

        if let Ok(s) = std::env::var("DEMO_HISTORY_DAYS") {
            if let Ok(n) = s.parse::<usize>() {
                out.days = n;
            }
        }

        out
    }
}

// (id, sector, market_cap, pe_ratio, dividend_yield, volatility, beta, daily drift)
const DEMO_INSTRUMENTS: [(&str, &str, f64, f64, f64, f64, f64, f64); 7] = [
    ("AAPL", "Technology", 2000.0, 25.0, 0.5, 0.2, 1.1, 0.0012),
    ("GOOGL", "Technology", 1500.0, 28.0, 0.0, 0.25, 1.2, 0.0010),
    ("MSFT", "Technology", 1800.0, 30.0, 1.0, 0.2, 1.0, 0.0011),
    ("AMZN", "Consumer", 1600.0, 70.0, 0.0, 0.3, 1.3, 0.0004),
    ("FB", "Technology", 800.0, 25.0, 0.0, 0.35, 1.4, 0.0009),
    ("NFLX", "Technology", 300.0, 90.0, 0.0, 0.4, 1.6, 0.0008),
    ("TSLA", "Automotive", 700.0, 100.0, 0.0, 0.5, 1.8, -0.0006),
];

pub fn demo_instruments() -> Vec<Instrument> {
    DEMO_INSTRUMENTS
        .iter()
        .map(|(id, sector, mc, pe, dy, vol, beta, _)| Instrument {
            instrument_id: id.to_string(),
            sector: sector.to_string(),
            market_cap: *mc,
            pe_ratio: *pe,
            dividend_yield: *dy,
            volatility: *vol,
            beta: *beta,
        })
        .collect()
}

pub fn demo_holdings() -> UserHoldings {
    let portfolio: Portfolio = [("AAPL", 100.0, 150.0), ("GOOGL", 50.0, 2500.0)]
        .into_iter()
        .map(|(id, quantity, purchase_price)| {
            (
                id.to_string(),
                Holding {
                    quantity,
                    purchase_price,
                },
            )
        })
        .collect();

    let mut out = UserHoldings::new();
    out.register("user1", portfolio);
    out
}

/// Deterministic daily history: a per-instrument drift plus a bounded oscillation.
pub fn demo_market_data(opts: &DemoOptions) -> anyhow::Result<Vec<MarketDataPoint>> {
    anyhow::ensure!(
        (2..=3650).contains(&opts.days),
        "demo history must be 2..=3650 days (got {})",
        opts.days
    );

    let first = opts.as_of_date - Duration::days(opts.days as i64 - 1);
    let mut out = Vec::with_capacity(DEMO_INSTRUMENTS.len() * opts.days);
    for (k, (id, sector, mc, _, _, vol, _, drift)) in DEMO_INSTRUMENTS.iter().enumerate() {
        let base = 100.0 + mc / 10.0;
        for day in 0..opts.days {
            let t = day as f64;
            let wobble = vol * 0.05 * (t * 0.7 + k as f64).sin();
            let price = base * (1.0 + drift).powf(t) * (1.0 + wobble);
            let volume = 1_000_000.0 * (1.0 + 0.3 * (t * 0.3 + 2.0 * k as f64).cos());

            out.push(MarketDataPoint {
                date: first + Duration::days(day as i64),
                instrument_id: id.to_string(),
                sector: sector.to_string(),
                price,
                volume,
            });
        }
    }

    Ok(out)
}
