use crate::config::Settings;
use crate::universe::ListingSource;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::time::Duration;

const NASDAQ_LISTED_URL: &str = "https://ftp.nasdaqtrader.com/SymbolDirectory/nasdaqlisted.txt";
const OTHER_LISTED_URL: &str = "https://ftp.nasdaqtrader.com/SymbolDirectory/otherlisted.txt";
const HSI_COMPONENTS_URL: &str = "https://finance.yahoo.com/quote/%5EHSI/components/";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Nasdaq Trader symbol directories for the US side, index components page for HK.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    http: reqwest::Client,
    hsi_components_url: String,
}

impl HttpListingSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build listing http client")?;

        Ok(Self {
            http,
            hsi_components_url: settings
                .hsi_components_url
                .clone()
                .unwrap_or_else(|| HSI_COMPONENTS_URL.to_string()),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("listing download failed: {url}"))?;
        let status = res.status();
        let text = res.text().await.context("read listing body failed")?;
        if !status.is_success() {
            anyhow::bail!("listing HTTP {status}: {url}");
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ListingSource for HttpListingSource {
    async fn domestic_symbols(&self) -> Result<Vec<String>> {
        let nasdaq = self.get_text(NASDAQ_LISTED_URL).await?;
        let other = self.get_text(OTHER_LISTED_URL).await?;

        let mut out = parse_symbol_directory(&nasdaq, "Symbol")?;
        out.extend(parse_symbol_directory(&other, "ACT Symbol")?);
        Ok(out)
    }

    async fn secondary_components(&self) -> Result<Vec<String>> {
        let page = self.get_text(&self.hsi_components_url).await?;
        let symbols = extract_hk_symbols(&page);
        anyhow::ensure!(!symbols.is_empty(), "no HK symbols found on components page");
        Ok(symbols)
    }
}

/// Parses a pipe-delimited Nasdaq Trader directory, keeping non-test issues from
/// `symbol_col`. The trailing "File Creation Time" row has no `Test Issue` value and is
/// dropped with the rest.
pub fn parse_symbol_directory(text: &str, symbol_col: &str) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().context("symbol directory has no header")?.clone();
    let sym_idx = headers
        .iter()
        .position(|h| h.trim() == symbol_col)
        .with_context(|| format!("symbol directory missing column {symbol_col:?}"))?;
    let test_idx = headers
        .iter()
        .position(|h| h.trim() == "Test Issue")
        .context("symbol directory missing column \"Test Issue\"")?;

    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record.context("malformed symbol directory row")?;
        if record.get(test_idx).map(str::trim) != Some("N") {
            continue;
        }
        if let Some(sym) = record.get(sym_idx).map(str::trim).filter(|s| !s.is_empty()) {
            out.push(sym.to_string());
        }
    }
    Ok(out)
}

/// Collects `NNNN.HK` symbols (1..=5 digits) from an HTML page, deduplicated and sorted.
pub fn extract_hk_symbols(page: &str) -> Vec<String> {
    let bytes = page.as_bytes();
    let mut out = BTreeSet::new();
    for (pos, _) in page.match_indices(".HK") {
        let mut start = pos;
        while start > 0 && bytes[start - 1].is_ascii_digit() && pos - start < 5 {
            start -= 1;
        }
        let digits = pos - start;
        if digits == 0 {
            continue;
        }
        // Reject matches glued to a longer token such as "ABC123.HK" or "123456.HK".
        if start > 0 && bytes[start - 1].is_ascii_alphanumeric() {
            continue;
        }
        out.insert(page[start..pos + 3].to_string());
    }
    out.into_iter().collect()
}
