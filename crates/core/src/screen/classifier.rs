use crate::config::env_parse;
use crate::domain::bar::Series;
use crate::domain::signal::{Signal, SignalHit};
use crate::domain::ticker::{Market, Ticker};
use crate::error::TickerSkip;
use crate::screen::indicators::IndicatorSnapshot;

/// Gate and rule constants. Defaults mirror the production scan.
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// Bars required before a ticker is considered (slowest window is 252 bars).
    pub min_history: usize,
    pub min_volume: f64,
    pub min_avg_volume_50: f64,
    /// Domestic floor is the higher one.
    pub min_price_us: f64,
    pub min_price_hk: f64,

    pub breakout_volume_mult: f64,
    pub power_play_high_ratio: f64,
    pub power_play_volume_mult: f64,
    pub tight_max_ratio: f64,
    pub tight_volume_mult: f64,
    pub ath_max_distance: f64,
    pub ath_volume_mult: f64,
    pub canslim_min_growth: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_history: 300,
            min_volume: 500_000.0,
            min_avg_volume_50: 800_000.0,
            min_price_us: 15.0,
            min_price_hk: 10.0,
            breakout_volume_mult: 1.5,
            power_play_high_ratio: 0.95,
            power_play_volume_mult: 2.0,
            tight_max_ratio: 1.02,
            tight_volume_mult: 0.8,
            ath_max_distance: 0.03,
            ath_volume_mult: 2.0,
            canslim_min_growth: 0.25,
        }
    }
}

impl Thresholds {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(n) = env_parse("SCAN_MIN_VOLUME") {
            out.min_volume = n;
        }
        if let Some(n) = env_parse("SCAN_MIN_AVG_VOLUME_50") {
            out.min_avg_volume_50 = n;
        }
        if let Some(n) = env_parse("SCAN_MIN_PRICE_US") {
            out.min_price_us = n;
        }
        if let Some(n) = env_parse("SCAN_MIN_PRICE_HK") {
            out.min_price_hk = n;
        }
        out
    }

    pub fn price_floor(&self, market: Market) -> f64 {
        match market {
            Market::Us => self.min_price_us,
            Market::Hk => self.min_price_hk,
        }
    }
}

/// A ticker that passed the gates, with the hits of the price/volume rules.
#[derive(Debug, Clone)]
pub struct Screened {
    pub ticker: Ticker,
    pub snapshot: IndicatorSnapshot,
    pub hits: Vec<SignalHit>,
}

impl Screened {
    /// CANSLIM can only fire above the 30-week mean, so skip the metadata lookup otherwise.
    pub fn wants_metadata(&self) -> bool {
        matches!(self.snapshot.sma_close_150, Some(sma) if self.snapshot.close > sma)
    }
}

/// Applies the history, liquidity and price gates, then every price/volume rule.
/// Rules are independent; a ticker may land in several categories.
pub fn screen_ticker(
    ticker: &Ticker,
    series: &Series,
    th: &Thresholds,
) -> Result<Screened, TickerSkip> {
    if series.len() < th.min_history {
        return Err(TickerSkip::InsufficientHistory {
            len: series.len(),
            required: th.min_history,
        });
    }

    let snap = IndicatorSnapshot::compute(series)?;
    let avg_volume_50 = snap
        .avg_volume_50
        .ok_or(TickerSkip::MissingIndicator("avg_volume_50"))?;

    if snap.volume < th.min_volume || avg_volume_50 < th.min_avg_volume_50 {
        return Err(TickerSkip::Illiquid {
            volume: snap.volume,
            avg_volume_50,
        });
    }

    let floor = th.price_floor(ticker.market());
    if snap.close < floor {
        return Err(TickerSkip::BelowPriceFloor {
            price: snap.close,
            floor,
        });
    }

    let mut hits = Vec::new();
    let mut push = |signal: Signal, line: String| hits.push(SignalHit { signal, line });

    if let (Some(sma), Some(high_252)) = (snap.sma_close_150, snap.high_252) {
        if snap.close > sma
            && snap.high >= high_252
            && snap.volume >= th.breakout_volume_mult * avg_volume_50
        {
            let mult = snap.volume / avg_volume_50;
            push(
                Signal::Stage2Breakout,
                format!("{}  Vol {mult:.1}×", price_change_line(ticker, &snap)),
            );
        }
    }

    if let Some(Some(down_max)) = snap.pivot_down_volume {
        if snap.change_pct() > 0.0 && snap.volume > down_max {
            push(Signal::PocketPivot, price_change_line(ticker, &snap));
        }
    }

    if let Some(high_252) = snap.high_252 {
        if snap.high >= th.power_play_high_ratio * high_252
            && snap.volume >= th.power_play_volume_mult * avg_volume_50
        {
            push(Signal::PowerPlay, price_change_line(ticker, &snap));
        }
    }

    if let Some(ratio) = snap.tight_ratio_15 {
        if ratio <= th.tight_max_ratio && snap.volume < th.tight_volume_mult * avg_volume_50 {
            push(Signal::ThreeWeekTight, price_line(ticker, &snap));
        }
    }

    if let Some(avg_volume_10) = snap.avg_volume_10 {
        let ath = snap.all_time_high;
        if ath > 0.0
            && (snap.high - ath).abs() / ath < th.ath_max_distance
            && snap.volume >= th.ath_volume_mult * avg_volume_10
        {
            push(Signal::AllTimeHighVolume, price_change_line(ticker, &snap));
        }
    }

    Ok(Screened {
        ticker: ticker.clone(),
        snapshot: snap,
        hits,
    })
}

/// Earnings-growth rule. `growth` is `None` when the metadata lookup failed or lacked the key.
pub fn canslim_hit(screened: &Screened, growth: Option<f64>, th: &Thresholds) -> Option<SignalHit> {
    let growth = growth.filter(|g| g.is_finite())?;
    if growth > th.canslim_min_growth && screened.wants_metadata() {
        return Some(SignalHit {
            signal: Signal::Canslim,
            line: format!(
                "{}  EPS↑{:.0}%",
                price_line(&screened.ticker, &screened.snapshot),
                growth * 100.0
            ),
        });
    }
    None
}

fn price_line(ticker: &Ticker, snap: &IndicatorSnapshot) -> String {
    format!("• {}   ${:.2}", ticker.display(), snap.close)
}

fn price_change_line(ticker: &Ticker, snap: &IndicatorSnapshot) -> String {
    format!("{}  ({:+.1}%)", price_line(ticker, snap), snap.change_pct())
}
