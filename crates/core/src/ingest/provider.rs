use crate::config::Settings;
use crate::ingest::types::PriceSeries;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/price_history";
const DEFAULT_RETRIES: u32 = 3;
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Pull interface of the external price/volume feed.
#[async_trait::async_trait]
pub trait MarketDataFeed: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// History of `symbol` over `period` (e.g. `1mo`, `3mo`) sampled every `interval` (e.g. `1d`).
    async fn fetch(&self, symbol: &str, period: &str, interval: &str) -> Result<PriceSeries>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonMarketDataFeed {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonMarketDataFeed {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let path = std::env::var("MARKET_DATA_HISTORY_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, symbol: &str, period: &str, interval: &str) -> Result<PriceSeries> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[("symbol", symbol), ("period", period), ("interval", interval)])
            .send()
            .await
            .with_context(|| format!("market data request failed for {symbol}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("market data response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status} for {symbol}: {raw_json}");
        }

        serde_json::from_value::<PriceSeries>(raw_json)
            .context("failed to parse market data response into PriceSeries")
    }
}

#[async_trait::async_trait]
impl MarketDataFeed for HttpJsonMarketDataFeed {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch(&self, symbol: &str, period: &str, interval: &str) -> Result<PriceSeries> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(symbol, period, interval).await {
                Ok(series) => {
                    validate_series(&series, symbol)?;
                    return Ok(series);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(%symbol, attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// 1s, 2s, 4s ... capped at 64s.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT))
}

pub fn validate_series(series: &PriceSeries, expected_symbol: &str) -> Result<()> {
    anyhow::ensure!(
        series.symbol.eq_ignore_ascii_case(expected_symbol),
        "market data symbol mismatch: expected {expected_symbol}, got {}",
        series.symbol
    );
    anyhow::ensure!(!series.bars.is_empty(), "{expected_symbol}: no bars returned");
    anyhow::ensure!(
        series.bars.windows(2).all(|w| w[0].date < w[1].date),
        "{expected_symbol}: bars must be in strictly ascending date order"
    );
    Ok(())
}
