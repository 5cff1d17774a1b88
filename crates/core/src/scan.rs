use crate::domain::signal::Signal;
use crate::error::{Stage, StageError, TickerSkip};
use crate::ingest::batch::{fetch_in_batches, BatchOptions};
use crate::ingest::provider::{earnings_growth, CompanyMetadataSource, MarketDataSource};
use crate::notify::Notifier;
use crate::report::{Digest, ReportOptions};
use crate::screen::classifier::{canslim_hit, screen_ticker, Thresholds};
use crate::time::hk_market;
use crate::universe::{resolve_universe, ListingSource, UniverseOptions};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every tunable of a scan, with production defaults.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub universe: UniverseOptions,
    pub batch: BatchOptions,
    pub thresholds: Thresholds,
    pub report: ReportOptions,
}

impl ScanConfig {
    pub fn from_env() -> Self {
        Self {
            universe: UniverseOptions::from_env(),
            batch: BatchOptions::from_env(),
            thresholds: Thresholds::from_env(),
            report: ReportOptions::from_env(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch.batch_size >= 1, "SCAN_BATCH_SIZE must be >= 1");
        anyhow::ensure!(
            self.batch.lookback.days > 0,
            "SCAN_LOOKBACK_DAYS must be > 0 (got {})",
            self.batch.lookback.days
        );
        self.report.validate()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub universe_size: usize,
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub tickers_fetched: usize,
    pub tickers_screened: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub hits: BTreeMap<Signal, usize>,
    pub errors: Vec<StageError>,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub digest: Digest,
    pub text: String,
    pub stats: ScanStats,
}

pub struct Scanner {
    config: ScanConfig,
    listings: Arc<dyn ListingSource>,
    market: Arc<dyn MarketDataSource>,
    metadata: Arc<dyn CompanyMetadataSource>,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        listings: Arc<dyn ListingSource>,
        market: Arc<dyn MarketDataSource>,
        metadata: Arc<dyn CompanyMetadataSource>,
    ) -> Self {
        Self {
            config,
            listings,
            market,
            metadata,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// One full scan. Recoverable failures are logged and collected in `stats.errors`;
    /// this always produces a report.
    pub async fn run(&self, now_utc: DateTime<Utc>) -> ScanReport {
        let cfg = &self.config;
        let mut stats = ScanStats::default();

        let universe = resolve_universe(self.listings.as_ref()).await;
        stats.errors.extend(universe.failures.iter().cloned());
        let tickers = universe.scan_list(&cfg.universe);
        stats.universe_size = tickers.len();
        tracing::info!(tickers = tickers.len(), "scanning universe");

        let fetched = fetch_in_batches(self.market.as_ref(), &tickers, &cfg.batch).await;
        stats.batches_ok = fetched.batches_ok;
        stats.batches_failed = fetched.batches_failed();
        stats.tickers_fetched = fetched.series.len();
        stats.errors.extend(fetched.failures.iter().cloned());

        let scan_date = hk_market::scan_date(now_utc).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "HK date unavailable; using UTC date");
            now_utc.date_naive()
        });
        let mut digest = Digest::new(scan_date, tickers.len());
        let mut metadata_calls: usize = 0;

        // Universe order, so digest lines are stable across runs with the same data.
        for ticker in &tickers {
            let Some(series) = fetched.series.get(ticker) else {
                continue;
            };

            let screened = match screen_ticker(ticker, series, &cfg.thresholds) {
                Ok(s) => s,
                Err(skip) => {
                    record_skip(&mut stats, &skip);
                    tracing::debug!(%ticker, reason = %skip, "ticker skipped");
                    continue;
                }
            };
            stats.tickers_screened += 1;

            let mut hits = screened.hits.clone();
            if screened.wants_metadata() {
                if metadata_calls > 0 && !cfg.batch.metadata_pause.is_zero() {
                    tokio::time::sleep(cfg.batch.metadata_pause).await;
                }
                metadata_calls += 1;
                match self.metadata.info(ticker).await {
                    Ok(info) => {
                        if let Some(hit) = canslim_hit(&screened, earnings_growth(&info), &cfg.thresholds) {
                            hits.push(hit);
                        }
                    }
                    Err(err) => {
                        tracing::debug!(%ticker, error = %err, "metadata lookup failed; CANSLIM skipped");
                        stats
                            .errors
                            .push(StageError::new(Stage::Metadata, ticker.symbol(), &err));
                    }
                }
            }

            for hit in &hits {
                *stats.hits.entry(hit.signal).or_default() += 1;
            }
            digest.extend(hits);
        }

        let text = digest.render(&cfg.report);
        tracing::info!(
            %scan_date,
            universe = stats.universe_size,
            fetched = stats.tickers_fetched,
            screened = stats.tickers_screened,
            batches_failed = stats.batches_failed,
            hits = digest.total_hits(),
            chars = text.chars().count(),
            "scan complete"
        );

        ScanReport {
            digest,
            text,
            stats,
        }
    }
}

fn record_skip(stats: &mut ScanStats, skip: &TickerSkip) {
    *stats.skipped.entry(skip.kind()).or_default() += 1;
}

/// Sends the digest; a delivery failure is returned as a `Notify` stage error for the
/// caller to log, never propagated.
pub async fn deliver(notifier: &dyn Notifier, recipient: &str, report: &ScanReport) -> Option<StageError> {
    match notifier.send(recipient, &report.text).await {
        Ok(()) => {
            tracing::info!(channel = notifier.channel(), "digest delivered");
            None
        }
        Err(err) => {
            tracing::error!(channel = notifier.channel(), error = %err, "digest delivery failed");
            Some(StageError::new(Stage::Notify, notifier.channel(), &err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::{Bar, Series};
    use crate::domain::ticker::Ticker;
    use crate::ingest::provider::{Lookback, EARNINGS_GROWTH_KEY};
    use crate::universe::HK_FALLBACK;
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Listings;

    #[async_trait::async_trait]
    impl ListingSource for Listings {
        async fn domestic_symbols(&self) -> Result<Vec<String>> {
            Ok(["BRKOUT", "SHORT", "THIN", "FLAT"].map(String::from).to_vec())
        }

        async fn secondary_components(&self) -> Result<Vec<String>> {
            anyhow::bail!("components page unavailable")
        }
    }

    fn bars(len: usize, breakout: bool, volume: f64) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let mut out: Vec<Bar> = (0..len)
            .map(|i| Bar {
                date: start + Duration::days(i as i64),
                open: 50.0,
                high: 51.0,
                low: 49.0,
                close: 50.0,
                volume,
            })
            .collect();
        if breakout {
            let last = out.len() - 1;
            out[last].close = 56.0;
            out[last].high = 57.0;
            out[last].volume = volume * 3.0;
        }
        out
    }

    /// Serves canned series for US tickers; fails any batch containing HK tickers.
    struct CannedMarket {
        fail_all: bool,
    }

    #[async_trait::async_trait]
    impl MarketDataSource for CannedMarket {
        fn provider_name(&self) -> &'static str {
            "canned"
        }

        async fn fetch_history(
            &self,
            tickers: &[Ticker],
            _lookback: Lookback,
        ) -> Result<HashMap<Ticker, Series>> {
            anyhow::ensure!(!self.fail_all, "rate limited");
            anyhow::ensure!(
                tickers.iter().all(|t| !t.symbol().ends_with(".HK")),
                "batch with HK tickers failed"
            );
            Ok(tickers
                .iter()
                .map(|t| {
                    let b = match t.symbol() {
                        "BRKOUT" => bars(320, true, 1_000_000.0),
                        "SHORT" => bars(120, true, 1_000_000.0),
                        "THIN" => bars(320, true, 100_000.0),
                        _ => bars(320, false, 1_000_000.0),
                    };
                    (t.clone(), Series::from_bars(b))
                })
                .collect())
        }
    }

    struct Metadata {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CompanyMetadataSource for Metadata {
        async fn info(&self, ticker: &Ticker) -> Result<BTreeMap<String, Value>> {
            self.calls.lock().unwrap().push(ticker.symbol().to_string());
            let mut out = BTreeMap::new();
            out.insert(EARNINGS_GROWTH_KEY.to_string(), json!(0.5));
            Ok(out)
        }
    }

    fn config() -> ScanConfig {
        let mut cfg = ScanConfig::default();
        cfg.batch.batch_size = 4;
        cfg.batch.pause = std::time::Duration::ZERO;
        cfg.batch.metadata_pause = std::time::Duration::ZERO;
        cfg
    }

    fn scanner(fail_all: bool) -> (Scanner, Arc<Metadata>) {
        let metadata = Arc::new(Metadata {
            calls: Mutex::new(Vec::new()),
        });
        let scanner = Scanner::new(
            config(),
            Arc::new(Listings),
            Arc::new(CannedMarket { fail_all }),
            metadata.clone(),
        );
        (scanner, metadata)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_scan_reports_matches_and_skips() {
        let (scanner, metadata) = scanner(false);
        let report = scanner.run(now()).await;

        // 4 US tickers in one batch, 5 HK fallback tickers in a failing batch.
        assert_eq!(report.stats.universe_size, 4 + HK_FALLBACK.len());
        assert_eq!(report.stats.batches_ok, 1);
        assert_eq!(report.stats.batches_failed, 2);
        assert_eq!(report.stats.tickers_fetched, 4);
        assert_eq!(report.stats.skipped.get("insufficient_history"), Some(&1));
        assert_eq!(report.stats.skipped.get("illiquid"), Some(&1));

        let stage2 = report.digest.members(Signal::Stage2Breakout);
        assert_eq!(stage2.len(), 1);
        assert!(stage2[0].starts_with("• BRKOUT   $56.00  (+12.0%)"));
        assert_eq!(report.digest.members(Signal::Canslim).len(), 1);
        // FLAT closes at its own mean, so no metadata lookup is made for it.
        assert_eq!(*metadata.calls.lock().unwrap(), vec!["BRKOUT".to_string()]);

        assert!(report.text.starts_with("2026-10-19 Daily scan: US+HK (9 tickers)"));
        assert!(report.text.contains("Stage 2 Breakout (1)"));
        assert!(!report.text.contains("SHORT"));
        assert!(!report.text.contains("THIN"));
        assert!(report
            .stats
            .errors
            .iter()
            .any(|e| e.stage == Stage::Universe));
    }

    #[tokio::test]
    async fn all_batches_failing_still_yields_header_only_report() {
        let (scanner, metadata) = scanner(true);
        let report = scanner.run(now()).await;
        assert_eq!(report.stats.batches_ok, 0);
        assert_eq!(report.stats.tickers_fetched, 0);
        assert_eq!(report.digest.total_hits(), 0);
        assert_eq!(report.text, "2026-10-19 Daily scan: US+HK (9 tickers)");
        assert!(metadata.calls.lock().unwrap().is_empty());
    }

    struct UnavailableMetadata;

    #[async_trait::async_trait]
    impl CompanyMetadataSource for UnavailableMetadata {
        async fn info(&self, _ticker: &Ticker) -> Result<BTreeMap<String, Value>> {
            anyhow::bail!("market data HTTP 401 Unauthorized")
        }
    }

    #[tokio::test]
    async fn metadata_failure_only_drops_canslim() {
        let scanner = Scanner::new(
            config(),
            Arc::new(Listings),
            Arc::new(CannedMarket { fail_all: false }),
            Arc::new(UnavailableMetadata),
        );
        let report = scanner.run(now()).await;

        assert_eq!(report.digest.members(Signal::Stage2Breakout).len(), 1);
        assert!(report.digest.members(Signal::Canslim).is_empty());
        assert!(!report.text.contains("IBD 50-style CANSLIM"));

        let meta: Vec<&StageError> = report
            .stats
            .errors
            .iter()
            .filter(|e| e.stage == Stage::Metadata)
            .collect();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].subject, "BRKOUT");
        assert!(meta[0].detail.contains("401"));
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        fn channel(&self) -> &'static str {
            "failing"
        }

        async fn send(&self, _recipient: &str, _text: &str) -> Result<()> {
            anyhow::bail!("HTTP 503")
        }
    }

    #[tokio::test]
    async fn delivery_failure_is_returned_not_raised() {
        let (scanner, _) = scanner(true);
        let report = scanner.run(now()).await;
        let err = deliver(&FailingNotifier, "+85200000000", &report).await.unwrap();
        assert_eq!(err.stage, Stage::Notify);
        assert!(err.detail.contains("503"));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
        let mut cfg = ScanConfig::default();
        cfg.batch.batch_size = 0;
        assert!(cfg.validate().is_err());
    }
}
