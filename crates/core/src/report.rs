use crate::config::env_parse;
use crate::domain::signal::{Signal, SignalHit};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DEFAULT_TRUNCATION_MARKER: &str = "\n... (truncated)";

#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Member lines shown per signal; extra matches are dropped, not summarized.
    pub per_signal_cap: usize,
    /// Upper bound on the rendered message, in characters.
    pub max_len: usize,
    pub truncation_marker: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            per_signal_cap: 20,
            max_len: 3000,
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
        }
    }
}

impl ReportOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(n) = env_parse("SCAN_PER_SIGNAL_CAP") {
            out.per_signal_cap = n;
        }
        if let Some(n) = env_parse("SCAN_MAX_MESSAGE_LEN") {
            out.max_len = n;
        }
        out
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.per_signal_cap >= 1, "SCAN_PER_SIGNAL_CAP must be >= 1");
        let marker_len = self.truncation_marker.chars().count();
        anyhow::ensure!(
            self.max_len > marker_len,
            "SCAN_MAX_MESSAGE_LEN must exceed the truncation marker length ({marker_len}), got {}",
            self.max_len
        );
        Ok(())
    }
}

/// Matches of one scan, grouped per signal in arrival order.
#[derive(Debug, Clone)]
pub struct Digest {
    pub scan_date: NaiveDate,
    pub universe_size: usize,
    members: BTreeMap<Signal, Vec<String>>,
}

impl Digest {
    pub fn new(scan_date: NaiveDate, universe_size: usize) -> Self {
        Self {
            scan_date,
            universe_size,
            members: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, hit: SignalHit) {
        self.members.entry(hit.signal).or_default().push(hit.line);
    }

    pub fn extend(&mut self, hits: impl IntoIterator<Item = SignalHit>) {
        for hit in hits {
            self.push(hit);
        }
    }

    pub fn members(&self, signal: Signal) -> &[String] {
        self.members.get(&signal).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_hits(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    pub fn header(&self) -> String {
        format!(
            "{} Daily scan: US+HK ({} tickers)",
            self.scan_date.format("%Y-%m-%d"),
            self.universe_size
        )
    }

    pub fn render(&self, opts: &ReportOptions) -> String {
        let mut lines = vec![self.header()];
        for signal in Signal::ALL {
            let members = self.members(signal);
            if members.is_empty() {
                continue;
            }
            lines.push(String::new());
            lines.push(format!("{} ({})", signal.label(), members.len()));
            lines.extend(members.iter().take(opts.per_signal_cap).cloned());
        }
        truncate_message(lines.join("\n"), opts.max_len, &opts.truncation_marker)
    }
}

/// Cuts `msg` on a char boundary so that the kept prefix plus `marker` fits in `max_len`
/// characters. Returns `msg` unchanged when it already fits.
pub fn truncate_message(msg: String, max_len: usize, marker: &str) -> String {
    if msg.chars().count() <= max_len {
        return msg;
    }
    let keep = max_len.saturating_sub(marker.chars().count());
    let cut = msg
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(msg.len());
    let mut out = msg[..cut].to_string();
    out.push_str(marker);
    out
}
