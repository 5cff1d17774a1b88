use crate::config::{env_parse, Settings};
use crate::domain::bar::Series;
use crate::domain::ticker::Ticker;
use crate::ingest::provider::{CompanyMetadataSource, Lookback, MarketDataSource};
use crate::ingest::types::{ChartResponse, QuoteSummaryResponse};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RETRIES: u32 = 3;
/// Backoff doubles per attempt; six attempts already wait 31s in total.
const MAX_RETRIES: u32 = 6;
const DEFAULT_CONCURRENCY: usize = 8;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";
const SUMMARY_MODULES: &str = "defaultKeyStatistics,financialData";
/// Answers 404 but sets the session cookie the crumb is bound to.
const SESSION_URL: &str = "https://fc.yahoo.com";
const CRUMB_PATH: &str = "/v1/test/getcrumb";

/// Chart + quote-summary client. One `fetch_history` call fans out over the batch with
/// bounded concurrency.
#[derive(Debug, Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    concurrency: usize,
    /// quoteSummary token, fetched once per client on first use.
    crumb: Arc<OnceCell<String>>,
}

impl YahooClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .yahoo_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = env_parse("YAHOO_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS);
        let retries = env_parse("YAHOO_RETRIES")
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);
        let concurrency = env_parse("YAHOO_CONCURRENCY")
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
            concurrency,
            crumb: Arc::new(OnceCell::new()),
        })
    }

    async fn crumb(&self) -> Result<&str> {
        self.crumb
            .get_or_try_init(|| self.fetch_crumb())
            .await
            .map(String::as_str)
    }

    async fn fetch_crumb(&self) -> Result<String> {
        self.http
            .get(SESSION_URL)
            .send()
            .await
            .context("failed to open market data session")?;

        let res = self
            .http
            .get(self.url(CRUMB_PATH))
            .send()
            .await
            .context("crumb request failed")?;
        let status = res.status();
        let text = res.text().await.context("failed to read crumb response")?;
        let crumb = parse_crumb(status, &text)?;
        tracing::debug!("market data session crumb acquired");
        Ok(crumb)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_series(&self, ticker: &Ticker, lookback: Lookback) -> Result<Series> {
        let now = chrono::Utc::now();
        let url = self.url(&format!("/v8/finance/chart/{}", ticker.symbol()));
        let params = [
            ("period1", lookback.start(now).timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
            ("interval", "1d".to_string()),
            ("events", "div,splits".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];
        let body: ChartResponse = self.get_json(&url, &params, ticker).await?;
        body.into_series()
            .with_context(|| format!("invalid chart payload for {ticker}"))
    }

    /// GET with retry on transport errors, 429 and 5xx (1s, 2s, 4s ... backoff).
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        ticker: &Ticker,
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let backoff = Duration::from_secs(1 << (attempt - 1));

            let res = match self.http.get(url).query(params).send().await {
                Ok(r) => r,
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err).context("market data request failed");
                    }
                    tracing::warn!(attempt, ?backoff, %ticker, error = %err, "market data request failed; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .context("failed to read market data response")?;

            if !status.is_success() {
                let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && attempt < self.retries {
                    tracing::warn!(attempt, ?backoff, %ticker, http_status = %status, "market data HTTP error; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                anyhow::bail!("market data HTTP {status} for {ticker}: {}", snippet(&text));
            }

            return serde_json::from_str::<T>(&text)
                .with_context(|| format!("market data response for {ticker} is not the expected JSON"));
        }
    }
}

#[async_trait::async_trait]
impl MarketDataSource for YahooClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_history(
        &self,
        tickers: &[Ticker],
        lookback: Lookback,
    ) -> Result<HashMap<Ticker, Series>> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for ticker in tickers.iter().cloned() {
            let client = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let res = client.fetch_series(&ticker, lookback).await;
                (ticker, res)
            });
        }

        let mut results = Vec::with_capacity(tickers.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.context("history task panicked")?);
        }
        collect_batch(results)
    }
}

/// Keeps every ticker that came back. Losing every ticker means the source itself is
/// down, not that the tickers are bad, so that is the only batch-level error.
fn collect_batch(results: Vec<(Ticker, Result<Series>)>) -> Result<HashMap<Ticker, Series>> {
    let requested = results.len();
    let mut out = HashMap::with_capacity(requested);
    let mut last_err: Option<anyhow::Error> = None;
    for (ticker, res) in results {
        match res {
            Ok(series) => {
                out.insert(ticker, series);
            }
            Err(err) => {
                tracing::debug!(%ticker, error = %err, "no history for ticker");
                last_err = Some(err);
            }
        }
    }

    if out.is_empty() {
        if let Some(err) = last_err {
            return Err(err.context(format!("all {requested} history requests in batch failed")));
        }
    }
    Ok(out)
}

#[async_trait::async_trait]
impl CompanyMetadataSource for YahooClient {
    async fn info(&self, ticker: &Ticker) -> Result<BTreeMap<String, Value>> {
        let url = self.url(&format!("/v10/finance/quoteSummary/{}", ticker.symbol()));
        let crumb = self.crumb().await?;
        let params = [
            ("modules", SUMMARY_MODULES.to_string()),
            ("crumb", crumb.to_string()),
        ];
        let body: QuoteSummaryResponse = self.get_json(&url, &params, ticker).await?;
        body.into_info()
    }
}

/// The crumb endpoint answers a bare token; anything else (HTML consent page, JSON error)
/// means the session cookie was not accepted.
fn parse_crumb(status: StatusCode, text: &str) -> Result<String> {
    let crumb = text.trim();
    anyhow::ensure!(
        status.is_success(),
        "crumb HTTP {status}: {}",
        snippet(crumb)
    );
    anyhow::ensure!(
        !crumb.is_empty() && !crumb.contains(['<', '{', ' ']),
        "unexpected crumb response: {}",
        snippet(crumb)
    );
    Ok(crumb.to_string())
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}
