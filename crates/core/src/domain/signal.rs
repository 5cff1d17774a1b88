use std::fmt;

/// Chart-pattern categories, in digest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Stage2Breakout,
    PocketPivot,
    PowerPlay,
    ThreeWeekTight,
    AllTimeHighVolume,
    Canslim,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::Stage2Breakout,
        Signal::PocketPivot,
        Signal::PowerPlay,
        Signal::ThreeWeekTight,
        Signal::AllTimeHighVolume,
        Signal::Canslim,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Signal::Stage2Breakout => "Stage 2 Breakout",
            Signal::PocketPivot => "Pocket Pivot",
            Signal::PowerPlay => "Power Play",
            Signal::ThreeWeekTight => "3-Week Tight Close",
            Signal::AllTimeHighVolume => "All-Time High + Volume Surge",
            Signal::Canslim => "IBD 50-style CANSLIM",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A ticker matching one signal, already rendered as a digest line.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHit {
    pub signal: Signal,
    pub line: String,
}
