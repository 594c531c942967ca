pub mod domain;
pub mod engine;
pub mod error;
pub mod explain;
pub mod features;
pub mod ingest;
pub mod recommend;
pub mod sectors;
pub mod similarity;
pub mod time;

pub use engine::{RecommenderSnapshot, SnapshotStore};
pub use error::RecommenderError;

pub mod config {
    use crate::time::{parse_windows, Window};
    use anyhow::Context;
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
        pub instruments_path: Option<PathBuf>,
        pub holdings_path: Option<PathBuf>,
        pub market_data_path: Option<PathBuf>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                market_data_api_key: std::env::var("MARKET_DATA_API_KEY").ok(),
                instruments_path: std::env::var("INSTRUMENTS_PATH").ok().map(PathBuf::from),
                holdings_path: std::env::var("HOLDINGS_PATH").ok().map(PathBuf::from),
                market_data_path: std::env::var("MARKET_DATA_PATH").ok().map(PathBuf::from),
            })
        }

        pub fn require_market_data_base_url(&self) -> anyhow::Result<&str> {
            self.market_data_base_url
                .as_deref()
                .context("MARKET_DATA_BASE_URL is required")
        }

        pub fn require_instruments_path(&self) -> anyhow::Result<&PathBuf> {
            self.instruments_path
                .as_ref()
                .context("INSTRUMENTS_PATH is required")
        }

        pub fn require_holdings_path(&self) -> anyhow::Result<&PathBuf> {
            self.holdings_path
                .as_ref()
                .context("HOLDINGS_PATH is required")
        }
    }

    /// Tuning of the recommendation run.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecommenderOptions {
        /// Look-back windows the sector metrics are computed for.
        pub windows: Vec<Window>,

        /// Window whose momentum scores are appended to the feature vectors.
        pub momentum_timeframe: String,

        /// Number of trending sectors the sector-trend strategy draws from.
        pub trending_sectors: usize,

        /// Top up short sector-trend results from further members of the trending sectors.
        pub sector_backfill: bool,
    }

    impl Default for RecommenderOptions {
        fn default() -> Self {
            Self {
                windows: Window::defaults(),
                momentum_timeframe: "month".to_string(),
                trending_sectors: 3,
                sector_backfill: true,
            }
        }
    }

    impl RecommenderOptions {
        pub fn from_env() -> Self {
            let mut out = Self::default();

            if let Ok(s) = std::env::var("RECOMMENDER_WINDOWS") {
                match parse_windows(&s) {
                    Ok(windows) => out.windows = windows,
                    Err(err) => {
                        tracing::warn!(value = %s, error = %err, "ignoring RECOMMENDER_WINDOWS")
                    }
                }
            }

            if let Ok(s) = std::env::var("RECOMMENDER_MOMENTUM_TIMEFRAME") {
                if !s.trim().is_empty() {
                    out.momentum_timeframe = s.trim().to_string();
                }
            }

            if let Ok(s) = std::env::var("RECOMMENDER_TRENDING_SECTORS") {
                if let Ok(n) = s.parse::<usize>() {
                    out.trending_sectors = n;
                }
            }

            if let Ok(s) = std::env::var("RECOMMENDER_SECTOR_BACKFILL") {
                if let Ok(b) = s.parse::<bool>() {
                    out.sector_backfill = b;
                }
            }

            out
        }
    }

}
