use crate::domain::bar::Series;
use crate::domain::ticker::Ticker;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// History request window. Bars are always daily and split/dividend adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub days: i64,
}

impl Default for Lookback {
    fn default() -> Self {
        // ~18 months; comfortably above the 300-bar minimum.
        Self { days: 548 }
    }
}

impl Lookback {
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days)
    }
}

/// Source of historical daily bars.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// One call per batch. Tickers without data may be omitted; an `Err` means the whole
    /// batch is lost.
    async fn fetch_history(
        &self,
        tickers: &[Ticker],
        lookback: Lookback,
    ) -> Result<HashMap<Ticker, Series>>;
}

/// Company fundamentals, keyed by provider field name (e.g. `earningsQuarterlyGrowth`).
#[async_trait::async_trait]
pub trait CompanyMetadataSource: Send + Sync {
    async fn info(&self, ticker: &Ticker) -> Result<BTreeMap<String, Value>>;
}

pub const EARNINGS_GROWTH_KEY: &str = "earningsQuarterlyGrowth";

/// Quarterly earnings growth as a fraction (0.25 = 25%), if present and numeric.
pub fn earnings_growth(info: &BTreeMap<String, Value>) -> Option<f64> {
    info.get(EARNINGS_GROWTH_KEY).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn earnings_growth_reads_numeric_field_only() {
        let mut info = BTreeMap::new();
        assert_eq!(earnings_growth(&info), None);
        info.insert(EARNINGS_GROWTH_KEY.to_string(), json!("0.3"));
        assert_eq!(earnings_growth(&info), None);
        info.insert(EARNINGS_GROWTH_KEY.to_string(), json!(0.3));
        assert_eq!(earnings_growth(&info), Some(0.3));
    }
}
