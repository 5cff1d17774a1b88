use std::fmt;

/// Pipeline stage a recovered failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Universe,
    Batch,
    Metadata,
    Notify,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Universe => "universe",
            Stage::Batch => "batch",
            Stage::Metadata => "metadata",
            Stage::Notify => "notify",
        }
    }
}

/// A failure that was recovered from (fallback list, skipped batch, skipped rule).
/// Kept so the run summary can report what went wrong without aborting the scan.
#[derive(Debug, Clone)]
pub struct StageError {
    pub stage: Stage,
    pub subject: String,
    pub detail: String,
}

impl StageError {
    pub fn new(stage: Stage, subject: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            stage,
            subject: subject.into(),
            detail: format!("{err:#}"),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error (subject={}): {}",
            self.stage.as_str(),
            self.subject,
            self.detail
        )
    }
}

impl std::error::Error for StageError {}

/// Why a ticker was left out of classification.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerSkip {
    InsufficientHistory { len: usize, required: usize },
    MissingIndicator(&'static str),
    Illiquid { volume: f64, avg_volume_50: f64 },
    BelowPriceFloor { price: f64, floor: f64 },
}

impl TickerSkip {
    pub fn kind(&self) -> &'static str {
        match self {
            TickerSkip::InsufficientHistory { .. } => "insufficient_history",
            TickerSkip::MissingIndicator(_) => "missing_indicator",
            TickerSkip::Illiquid { .. } => "illiquid",
            TickerSkip::BelowPriceFloor { .. } => "below_price_floor",
        }
    }
}

impl fmt::Display for TickerSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickerSkip::InsufficientHistory { len, required } => {
                write!(f, "insufficient history: {len} bars (need {required})")
            }
            TickerSkip::MissingIndicator(name) => write!(f, "indicator unavailable: {name}"),
            TickerSkip::Illiquid {
                volume,
                avg_volume_50,
            } => write!(f, "illiquid: volume={volume:.0}, avg_volume_50={avg_volume_50:.0}"),
            TickerSkip::BelowPriceFloor { price, floor } => {
                write!(f, "price {price:.2} below floor {floor:.2}")
            }
        }
    }
}

impl std::error::Error for TickerSkip {}
