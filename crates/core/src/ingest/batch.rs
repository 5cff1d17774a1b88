use crate::config::env_parse;
use crate::domain::bar::Series;
use crate::domain::ticker::Ticker;
use crate::error::{Stage, StageError};
use crate::ingest::provider::{Lookback, MarketDataSource};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    /// Sleep between consecutive batches (rate limiting).
    pub pause: Duration,
    /// Sleep between consecutive per-ticker metadata lookups.
    pub metadata_pause: Duration,
    pub lookback: Lookback,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 200,
            pause: Duration::from_millis(300),
            metadata_pause: Duration::from_millis(100),
            lookback: Lookback::default(),
        }
    }
}

impl BatchOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(n) = env_parse("SCAN_BATCH_SIZE") {
            out.batch_size = n;
        }
        if let Some(ms) = env_parse::<u64>("SCAN_BATCH_PAUSE_MS") {
            out.pause = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SCAN_METADATA_PAUSE_MS") {
            out.metadata_pause = Duration::from_millis(ms);
        }
        if let Some(days) = env_parse("SCAN_LOOKBACK_DAYS") {
            out.lookback = Lookback { days };
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub series: HashMap<Ticker, Series>,
    pub batches_ok: usize,
    pub failures: Vec<StageError>,
}

impl BatchOutcome {
    pub fn batches_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Fetches `tickers` in contiguous batches, in order. A failed batch is logged and skipped
/// (no retry at this level); its tickers are absent from the result. Never fails.
pub async fn fetch_in_batches(
    source: &dyn MarketDataSource,
    tickers: &[Ticker],
    opts: &BatchOptions,
) -> BatchOutcome {
    let mut out = BatchOutcome::default();
    let batch_size = opts.batch_size.max(1);
    let total = tickers.len().div_ceil(batch_size);

    for (idx, batch) in tickers.chunks(batch_size).enumerate() {
        if idx != 0 && !opts.pause.is_zero() {
            tokio::time::sleep(opts.pause).await;
        }

        let batch_no = idx + 1;
        match source.fetch_history(batch, opts.lookback).await {
            Ok(map) => {
                let received = map.len();
                let mut kept = 0usize;
                for (ticker, series) in map {
                    if series.is_empty() {
                        continue;
                    }
                    out.series.insert(ticker, series);
                    kept += 1;
                }
                out.batches_ok += 1;
                tracing::info!(
                    batch = batch_no,
                    total,
                    requested = batch.len(),
                    received,
                    kept,
                    provider = source.provider_name(),
                    "batch fetched"
                );
            }
            Err(err) => {
                tracing::warn!(
                    batch = batch_no,
                    total,
                    requested = batch.len(),
                    error = %err,
                    "batch fetch failed; skipping batch"
                );
                out.failures
                    .push(StageError::new(Stage::Batch, format!("batch {batch_no}"), &err));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Fails every batch whose index is listed; returns one bar per ticker otherwise,
    /// except for tickers named `EMPTY`.
    struct FakeSource {
        fail_batches: Vec<usize>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeSource {
        fn new(fail_batches: Vec<usize>) -> Self {
            Self {
                fail_batches,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl MarketDataSource for FakeSource {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_history(
            &self,
            tickers: &[Ticker],
            _lookback: Lookback,
        ) -> anyhow::Result<HashMap<Ticker, Series>> {
            let idx = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(tickers.iter().map(|t| t.symbol().to_string()).collect());
                calls.len() - 1
            };
            anyhow::ensure!(!self.fail_batches.contains(&idx), "provider unavailable");

            let bar = Bar {
                date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            };
            Ok(tickers
                .iter()
                .map(|t| {
                    let bars = if t.symbol() == "EMPTY" { vec![] } else { vec![bar] };
                    (t.clone(), Series::from_bars(bars))
                })
                .collect())
        }
    }

    fn tickers(n: usize) -> Vec<Ticker> {
        (0..n).map(|i| Ticker::us(&format!("T{i}")).unwrap()).collect()
    }

    fn opts(batch_size: usize) -> BatchOptions {
        BatchOptions {
            batch_size,
            pause: Duration::ZERO,
            metadata_pause: Duration::ZERO,
            lookback: Lookback::default(),
        }
    }

    #[tokio::test]
    async fn partitions_into_contiguous_batches_in_order() {
        let source = FakeSource::new(vec![]);
        let out = fetch_in_batches(&source, &tickers(5), &opts(2)).await;
        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![vec!["T0", "T1"], vec!["T2", "T3"], vec!["T4"]]
        );
        assert_eq!(out.series.len(), 5);
        assert_eq!(out.batches_ok, 3);
        assert_eq!(out.batches_failed(), 0);
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_and_others_survive() {
        let source = FakeSource::new(vec![1]);
        let out = fetch_in_batches(&source, &tickers(6), &opts(2)).await;
        assert_eq!(out.series.len(), 4);
        assert!(!out.series.contains_key(&Ticker::us("T2").unwrap()));
        assert!(!out.series.contains_key(&Ticker::us("T3").unwrap()));
        assert_eq!(out.batches_failed(), 1);
        assert_eq!(out.failures[0].stage, Stage::Batch);
    }

    #[tokio::test]
    async fn all_batches_failing_yields_empty_map() {
        let source = FakeSource::new(vec![0, 1, 2]);
        let out = fetch_in_batches(&source, &tickers(5), &opts(2)).await;
        assert!(out.series.is_empty());
        assert_eq!(out.batches_failed(), 3);
    }

    #[tokio::test]
    async fn drops_tickers_with_empty_series() {
        let source = FakeSource::new(vec![]);
        let mut input = tickers(2);
        input.push(Ticker::us("EMPTY").unwrap());
        let out = fetch_in_batches(&source, &input, &opts(10)).await;
        assert_eq!(out.series.len(), 2);
    }
}
