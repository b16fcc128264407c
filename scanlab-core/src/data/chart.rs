//! HTTP chart-API provider.
//!
//! Speaks the v8 chart JSON shape (`timestamp` plus `indicators.quote[0]`).
//! Makes one request per call; retry belongs to the fetcher.

use super::provider::{BarProvider, DataError};
use crate::domain::{Bar, Interval};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct ChartApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Upstream ticker built from `{symbol}` and `{exchange}`.
    pub symbol_template: String,
    pub timeout: Duration,
}

impl ChartApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            symbol_template: "{exchange}:{symbol}".into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The blocking client is built on first use, on the fetching thread. Building
/// it inside an async runtime panics, and providers are constructed there.
pub struct ChartApiProvider {
    client: OnceLock<reqwest::blocking::Client>,
    config: ChartApiConfig,
}

impl ChartApiProvider {
    pub fn new(config: ChartApiConfig) -> Self {
        Self {
            client: OnceLock::new(),
            config,
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, DataError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(concat!("scanlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(self.client.get_or_init(|| built))
    }

    fn ticker(&self, symbol: &str, exchange: &str) -> String {
        self.config
            .symbol_template
            .replace("{symbol}", symbol)
            .replace("{exchange}", exchange)
    }

    /// Request window wide enough to hold `n_bars` trading bars.
    fn chart_url(&self, ticker: &str, interval: Interval, n_bars: usize) -> String {
        let end = chrono::Utc::now().timestamp();
        // sessions cover a fraction of the clock; over-ask and trim
        let pad = if interval.seconds() < Interval::Daily.seconds() {
            6
        } else {
            2
        };
        let span = (n_bars.max(1) as i64) * interval.seconds() * pad + 7 * 86_400;
        format!(
            "{}/v8/finance/chart/{ticker}?period1={}&period2={end}&interval={}",
            self.config.base_url.trim_end_matches('/'),
            end - span,
            chart_interval(interval),
        )
    }

    fn parse_response(
        symbol: &str,
        exchange: &str,
        resp: ChartResponse,
    ) -> Result<Vec<Bar>, DataError> {
        let not_found = || DataError::SymbolNotFound {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
        };

        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => not_found(),
            Some(err) => {
                DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::ResponseFormatChanged("no timestamps".into()))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let time = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
            let (open, high, low, close, volume) = (
                field(&quote.open),
                field(&quote.high),
                field(&quote.low),
                field(&quote.close),
                field(&quote.volume),
            );

            // Skip slots where everything is missing (halts, holidays)
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            bars.push(Bar {
                time,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0.0),
            });
        }

        Ok(bars)
    }
}

fn chart_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::Minute1 => "1m",
        Interval::Minute5 => "5m",
        Interval::Minute15 => "15m",
        Interval::Minute30 => "30m",
        Interval::Hour1 => "60m",
        Interval::Hour4 => "4h",
        Interval::Daily => "1d",
        Interval::Weekly => "1wk",
    }
}

impl BarProvider for ChartApiProvider {
    fn name(&self) -> &str {
        "chart_api"
    }

    fn get_hist(
        &self,
        symbol: &str,
        exchange: &str,
        interval: Interval,
        n_bars: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let ticker = self.ticker(symbol, exchange);
        let url = self.chart_url(&ticker, interval, n_bars);

        let mut req = self.client()?.get(&url);
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DataError::AuthenticationRequired(format!(
                "HTTP {status} from chart API"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
                exchange: exchange.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {ticker}")));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
        })?;

        let mut bars = Self::parse_response(symbol, exchange, chart)?;
        if bars.len() > n_bars {
            bars.drain(..bars.len() - n_bars);
        }
        Ok(bars)
    }
}
