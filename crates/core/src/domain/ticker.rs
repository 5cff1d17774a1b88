use std::fmt;

const HK_SUFFIX: &str = ".HK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Market {
    /// NASDAQ / NYSE / AMEX listings.
    Us,
    /// Hong Kong exchange.
    Hk,
}

/// A scan target. Construct through `Ticker::us` / `Ticker::hk` so the symbol is
/// normalized to the provider convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker {
    symbol: String,
    market: Market,
}

impl Ticker {
    /// US listing symbol. Class separators (`BRK.B`) become `BRK-B`.
    pub fn us(symbol: &str) -> Option<Self> {
        let s = symbol.trim().to_ascii_uppercase();
        if s.is_empty() || s.contains('$') || s.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self {
            symbol: s.replace('.', "-"),
            market: Market::Us,
        })
    }

    /// Hong Kong code in any of the common spellings (`700`, `0700`, `00700.HK`, `0700.hk*`).
    /// Normalized to a four-digit zero-padded code with the `.HK` suffix.
    pub fn hk(code: &str) -> Option<Self> {
        let s = code.trim().trim_end_matches('*').to_ascii_uppercase();
        let digits = s.strip_suffix(HK_SUFFIX).unwrap_or(s.as_str());
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n = digits.parse::<u32>().ok()?;
        if n == 0 {
            return None;
        }
        Some(Self {
            symbol: format!("{n:04}{HK_SUFFIX}"),
            market: Market::Hk,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Symbol shown in the digest (market suffix stripped).
    pub fn display(&self) -> &str {
        self.symbol
            .strip_suffix(HK_SUFFIX)
            .unwrap_or(self.symbol.as_str())
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_hk_codes_to_four_digits() {
        for raw in ["700", "0700", "00700.HK", "0700.hk", "0700.HK*"] {
            let t = Ticker::hk(raw).unwrap();
            assert_eq!(t.symbol(), "0700.HK", "input {raw}");
            assert_eq!(t.display(), "0700");
        }
        assert_eq!(Ticker::hk("09988.HK").unwrap().symbol(), "9988.HK");
        assert!(Ticker::hk("ABC.HK").is_none());
        assert!(Ticker::hk("").is_none());
    }

    #[test]
    fn us_symbols_use_dash_class_separator() {
        assert_eq!(Ticker::us("brk.b").unwrap().symbol(), "BRK-B");
        assert_eq!(Ticker::us("AAPL").unwrap().display(), "AAPL");
        assert!(Ticker::us("ABC$A").is_none());
        assert!(Ticker::us("  ").is_none());
    }
}
