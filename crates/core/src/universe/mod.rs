pub mod listings;

use crate::config::env_parse;
use crate::domain::ticker::{Market, Ticker};
use crate::error::{Stage, StageError};
use anyhow::Result;
use std::collections::{BTreeSet, HashSet};

/// Also the priority list: when listed, these lead the domestic scan order.
pub const US_FALLBACK: &[&str] = &["AAPL", "MSFT", "NVDA", "TSLA", "GOOGL"];
pub const HK_FALLBACK: &[&str] = &["0700.HK", "9988.HK", "3690.HK", "0005.HK", "0388.HK"];

/// Large caps always scanned on the HK side, on top of the index components.
pub const HK_CURATED: &[&str] = &[
    "0001.HK", "0002.HK", "0003.HK", "0005.HK", "0011.HK", "0016.HK", "0019.HK", "0066.HK",
    "0083.HK", "0388.HK", "0700.HK", "9988.HK", "3690.HK", "1810.HK", "1211.HK", "0941.HK",
    "1398.HK", "3988.HK", "0939.HK", "0688.HK", "0823.HK", "1088.HK", "1109.HK", "1929.HK",
    "2269.HK", "2388.HK", "2628.HK", "3328.HK", "3968.HK", "9618.HK", "9888.HK", "9961.HK",
    "9992.HK",
];

/// Where the raw symbol lists come from.
#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    /// Domestic (US) listed symbols, test issues already removed.
    async fn domestic_symbols(&self) -> Result<Vec<String>>;

    /// Benchmark index components of the secondary (HK) market.
    async fn secondary_components(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct UniverseOptions {
    /// At most this many US tickers are scanned; all HK tickers are kept.
    pub max_domestic: usize,
}

impl Default for UniverseOptions {
    fn default() -> Self {
        Self { max_domestic: 1500 }
    }
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(n) = env_parse("SCAN_MAX_DOMESTIC") {
            out.max_domestic = n;
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Scan order: listed priority names first, then listing order.
    pub us: Vec<Ticker>,
    pub hk: BTreeSet<Ticker>,
    /// Sources that failed and were replaced by the fallback list.
    pub failures: Vec<StageError>,
}

impl Universe {
    /// Capped US tickers followed by every HK ticker.
    pub fn scan_list(&self, opts: &UniverseOptions) -> Vec<Ticker> {
        self.us
            .iter()
            .take(opts.max_domestic)
            .chain(self.hk.iter())
            .cloned()
            .collect()
    }

    pub fn used_fallback(&self, market: Market) -> bool {
        let subject = market_subject(market);
        self.failures.iter().any(|f| f.subject == subject)
    }
}

/// Builds the scan universe. Each market falls back to its default list independently;
/// this never fails.
pub async fn resolve_universe(source: &dyn ListingSource) -> Universe {
    let mut out = Universe::default();

    match source.domestic_symbols().await.and_then(|raw| {
        let list = domestic_scan_order(&raw);
        anyhow::ensure!(!list.is_empty(), "domestic listing is empty");
        Ok(list)
    }) {
        Ok(list) => {
            tracing::info!(count = list.len(), "US tickers loaded");
            out.us = list;
        }
        Err(err) => {
            tracing::warn!(error = %err, "US listing fetch failed; using fallback list");
            out.failures
                .push(StageError::new(Stage::Universe, market_subject(Market::Us), &err));
            out.us = US_FALLBACK.iter().filter_map(|s| Ticker::us(s)).collect();
        }
    }

    match source.secondary_components().await {
        Ok(components) => {
            let set: BTreeSet<Ticker> = components
                .iter()
                .map(String::as_str)
                .chain(HK_CURATED.iter().copied())
                .filter_map(Ticker::hk)
                .collect();
            tracing::info!(
                components = components.len(),
                count = set.len(),
                "HK tickers loaded"
            );
            out.hk = set;
        }
        Err(err) => {
            tracing::warn!(error = %err, "HK components fetch failed; using fallback list");
            out.failures
                .push(StageError::new(Stage::Universe, market_subject(Market::Hk), &err));
            out.hk = HK_FALLBACK.iter().copied().filter_map(Ticker::hk).collect();
        }
    }

    out
}

/// Normalizes and dedupes the listing, keeping first-seen order, and moves listed
/// priority names to the front so the domestic cap never drops them.
fn domestic_scan_order(raw: &[String]) -> Vec<Ticker> {
    let mut seen = HashSet::new();
    let listed: Vec<Ticker> = raw
        .iter()
        .filter_map(|s| Ticker::us(s))
        .filter(|t| seen.insert(t.clone()))
        .collect();

    let priority: HashSet<Ticker> = US_FALLBACK.iter().filter_map(|s| Ticker::us(s)).collect();
    let (mut front, rest): (Vec<Ticker>, Vec<Ticker>) =
        listed.into_iter().partition(|t| priority.contains(t));
    front.extend(rest);
    front
}

fn market_subject(market: Market) -> &'static str {
    match market {
        Market::Us => "us_listing",
        Market::Hk => "hk_components",
    }
}
