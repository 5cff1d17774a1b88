use crate::domain::bar::{Bar, Series};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartEnvelope {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ProviderError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: String,
    /// Exchange offset from UTC, in seconds.
    #[serde(default)]
    pub gmtoffset: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<QuoteColumns>,
    #[serde(default)]
    pub adjclose: Vec<AdjCloseColumn>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteColumns {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdjCloseColumn {
    #[serde(default)]
    pub adjclose: Vec<Option<f64>>,
}

impl ChartResponse {
    /// Converts the columnar payload into an adjusted daily series. Rows with any missing
    /// field are dropped.
    pub fn into_series(self) -> Result<Series> {
        if let Some(err) = self.chart.error {
            anyhow::bail!("chart error {}: {}", err.code, err.description);
        }
        let result = self
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .context("chart response has no result")?;

        let offset = FixedOffset::east_opt(result.meta.gmtoffset)
            .context("invalid exchange gmtoffset")?;
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
        let adj = result
            .indicators
            .adjclose
            .into_iter()
            .next()
            .unwrap_or_default()
            .adjclose;

        let at = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, &ts) in result.timestamp.iter().enumerate() {
            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
                at(&quote.open, i),
                at(&quote.high, i),
                at(&quote.low, i),
                at(&quote.close, i),
                at(&quote.volume, i),
            ) else {
                continue;
            };
            let Some(dt) = DateTime::from_timestamp(ts, 0) else {
                continue;
            };

            let factor = match at(&adj, i) {
                Some(a) if close != 0.0 => a / close,
                _ => 1.0,
            };

            bars.push(Bar {
                date: dt.with_timezone(&offset).date_naive(),
                open: open * factor,
                high: high * factor,
                low: low * factor,
                close: close * factor,
                volume,
            });
        }

        Ok(Series::from_bars(bars))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummaryResponse {
    pub quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSummaryEnvelope {
    #[serde(default)]
    pub result: Option<Vec<BTreeMap<String, Value>>>,
    #[serde(default)]
    pub error: Option<ProviderError>,
}

impl QuoteSummaryResponse {
    /// Flattens every module into one map; `{"raw": x, "fmt": ..}` wrappers become `x` and
    /// empty wrappers are dropped.
    pub fn into_info(self) -> Result<BTreeMap<String, Value>> {
        if let Some(err) = self.quote_summary.error {
            anyhow::bail!("quoteSummary error {}: {}", err.code, err.description);
        }
        let modules = self
            .quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .context("quoteSummary response has no result")?;

        let mut out = BTreeMap::new();
        for (_, module) in modules {
            let Value::Object(fields) = module else {
                continue;
            };
            for (key, val) in fields {
                let val = match val {
                    Value::Object(mut obj) => match obj.remove("raw") {
                        Some(raw) => raw,
                        None if obj.is_empty() => continue,
                        None => Value::Object(obj),
                    },
                    other => other,
                };
                out.entry(key).or_insert(val);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn chart_payload_becomes_adjusted_series() {
        // 2026-01-02 and 2026-01-05 14:30 UTC (US open), one null row in between.
        let v = json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "gmtoffset": -18000},
                    "timestamp": [1767364200, 1767450600, 1767623400],
                    "indicators": {
                        "quote": [{
                            "open": [10.0, null, 12.0],
                            "high": [11.0, 11.5, 13.0],
                            "low": [9.0, 10.5, 11.0],
                            "close": [10.0, 11.0, 12.0],
                            "volume": [1000, 1100, 1200]
                        }],
                        "adjclose": [{"adjclose": [5.0, 5.5, 12.0]}]
                    }
                }],
                "error": null
            }
        });

        let parsed: ChartResponse = serde_json::from_value(v).unwrap();
        let series = parsed.into_series().unwrap();
        assert_eq!(series.len(), 2);
        let first = series.bars()[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(first.close, 5.0);
        assert_eq!(first.high, 5.5);
        assert_eq!(first.volume, 1000.0);
        assert_eq!(series.latest().unwrap().close, 12.0);
    }

    #[test]
    fn chart_error_is_reported() {
        let v = json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        });
        let parsed: ChartResponse = serde_json::from_value(v).unwrap();
        let err = parsed.into_series().unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn quote_summary_flattens_raw_values() {
        let v = json!({
            "quoteSummary": {
                "result": [{
                    "defaultKeyStatistics": {
                        "earningsQuarterlyGrowth": {"raw": 0.312, "fmt": "31.20%"},
                        "pegRatio": {},
                        "lastSplitFactor": "4:1"
                    },
                    "financialData": {
                        "revenueGrowth": {"raw": 0.08, "fmt": "8.00%"}
                    }
                }],
                "error": null
            }
        });
        let parsed: QuoteSummaryResponse = serde_json::from_value(v).unwrap();
        let info = parsed.into_info().unwrap();
        assert_eq!(info.get("earningsQuarterlyGrowth"), Some(&json!(0.312)));
        assert_eq!(info.get("revenueGrowth"), Some(&json!(0.08)));
        assert_eq!(info.get("lastSplitFactor"), Some(&json!("4:1")));
        assert!(!info.contains_key("pegRatio"));
    }
}
