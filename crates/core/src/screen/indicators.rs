use crate::domain::bar::Series;
use crate::error::TickerSkip;

pub const VOLUME_FAST_WINDOW: usize = 10;
pub const VOLUME_SLOW_WINDOW: usize = 50;
/// ~30 weeks.
pub const CLOSE_MEAN_WINDOW: usize = 150;
/// ~52 weeks.
pub const RANGE_WINDOW: usize = 252;
/// ~3 weeks.
pub const TIGHT_WINDOW: usize = 15;
pub const PIVOT_LOOKBACK: usize = 10;

/// Mean of the last `window` values (current value included).
pub fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    let tail = trailing(values, window)?;
    Some(tail.iter().sum::<f64>() / window as f64)
}

pub fn trailing_max(values: &[f64], window: usize) -> Option<f64> {
    trailing(values, window)?.iter().copied().reduce(f64::max)
}

pub fn trailing_min(values: &[f64], window: usize) -> Option<f64> {
    trailing(values, window)?.iter().copied().reduce(f64::min)
}

fn trailing(values: &[f64], window: usize) -> Option<&[f64]> {
    if window == 0 || values.len() < window {
        return None;
    }
    Some(&values[values.len() - window..])
}

/// Indicator values as of the last bar of a series. Windowed fields are `None` when the
/// series is shorter than the window.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub high: f64,
    pub volume: f64,
    pub prev_close: f64,
    pub avg_volume_10: Option<f64>,
    pub avg_volume_50: Option<f64>,
    pub sma_close_150: Option<f64>,
    pub high_252: Option<f64>,
    pub low_252: Option<f64>,
    pub all_time_high: f64,
    /// max/min of the last 15 closes.
    pub tight_ratio_15: Option<f64>,
    /// Largest volume among down days in the 10 bars before the latest one.
    /// `Some(None)` when the window is filled but holds no down day.
    pub pivot_down_volume: Option<Option<f64>>,
}

impl IndicatorSnapshot {
    pub fn compute(series: &Series) -> Result<Self, TickerSkip> {
        let (Some(latest), Some(prev)) = (series.latest(), series.previous()) else {
            return Err(TickerSkip::InsufficientHistory {
                len: series.len(),
                required: 2,
            });
        };

        let closes = series.closes();
        let highs = series.highs();
        let volumes = series.volumes();

        let all_time_high = highs.iter().copied().fold(f64::MIN, f64::max);

        let tight_ratio_15 = match (
            trailing_max(&closes, TIGHT_WINDOW),
            trailing_min(&closes, TIGHT_WINDOW),
        ) {
            (Some(max), Some(min)) if min > 0.0 => Some(max / min),
            _ => None,
        };

        Ok(Self {
            close: latest.close,
            high: latest.high,
            volume: latest.volume,
            prev_close: prev.close,
            avg_volume_10: trailing_mean(&volumes, VOLUME_FAST_WINDOW),
            avg_volume_50: trailing_mean(&volumes, VOLUME_SLOW_WINDOW),
            sma_close_150: trailing_mean(&closes, CLOSE_MEAN_WINDOW),
            high_252: trailing_max(&highs, RANGE_WINDOW),
            low_252: trailing_min(&series.lows(), RANGE_WINDOW),
            all_time_high,
            tight_ratio_15,
            pivot_down_volume: down_day_volume_max(&closes, &volumes, PIVOT_LOOKBACK),
        })
    }

    /// Percent change of the latest close against the previous close.
    pub fn change_pct(&self) -> f64 {
        if self.prev_close == 0.0 {
            return 0.0;
        }
        (self.close / self.prev_close - 1.0) * 100.0
    }
}

/// Over the `lookback` bars preceding the last one, the max volume of bars that closed
/// below their own previous close. Needs `lookback + 2` bars in total.
fn down_day_volume_max(closes: &[f64], volumes: &[f64], lookback: usize) -> Option<Option<f64>> {
    let n = closes.len();
    if lookback == 0 || n < lookback + 2 {
        return None;
    }
    let first = n - 1 - lookback;
    Some(
        (first..n - 1)
            .filter(|&i| closes[i] < closes[i - 1])
            .map(|i| volumes[i])
            .reduce(f64::max),
    )
}
