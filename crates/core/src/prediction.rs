//! Prediction text parsing
//!
//! The AI advisory collaborator returns free-form text. Parsing it is
//! consolidated into this single pure function rather than ad hoc regexes at
//! every call site, so the field grammar and fallback defaults live in one
//! place and can be tested against literal strings without live model calls.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Direction the model expects prices to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTrend {
    Rising,
    Falling,
    Stable,
}

/// Structured fields extracted from free-form prediction text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceOutlook {
    pub trend: PriceTrend,
    /// Model confidence, clamped to 0-100.
    pub confidence_pct: u8,
    /// Predicted prices in day order, one per "Day N" line found.
    pub daily_prices: Vec<f64>,
}

// Patterns are literals; compilation is exercised by every parser test.
#[allow(clippy::expect_used)]
static RISING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(rise|rising|rises|increase|increasing|upward|uptrend|bullish)\b")
        .expect("rising pattern compiles")
});

#[allow(clippy::expect_used)]
static FALLING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fall|falling|falls|decrease|decreasing|downward|downtrend|bearish|decline|declining)\b")
        .expect("falling pattern compiles")
});

#[allow(clippy::expect_used)]
static CONFIDENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)confidence[^0-9%]*(\d{1,3})\s*%").expect("confidence pattern compiles")
});

#[allow(clippy::expect_used)]
static DAILY_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)day\s*(\d+)\s*[:\-]\s*(?:₹|rs\.?|inr)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
        .expect("daily price pattern compiles")
});

/// Parse free-form prediction text into structured fields.
///
/// Field grammar:
/// - **trend**: whichever rising/falling keyword appears first in the text
///   wins; neither present means `Stable`.
/// - **confidence**: first `confidence ... N%` group, clamped to 0-100;
///   absent means `50`.
/// - **daily prices**: every `Day N: ₹X` line (also accepts `Rs`/`INR` and a
///   bare number), ordered by day number, thousands separators stripped;
///   none found means an empty vector.
pub fn parse_price_outlook(text: &str) -> PriceOutlook {
    PriceOutlook {
        trend: parse_trend(text),
        confidence_pct: parse_confidence(text),
        daily_prices: parse_daily_prices(text),
    }
}

fn parse_trend(text: &str) -> PriceTrend {
    let rising = RISING_RE.find(text).map(|m| m.start());
    let falling = FALLING_RE.find(text).map(|m| m.start());
    match (rising, falling) {
        (Some(r), Some(f)) => {
            if r <= f {
                PriceTrend::Rising
            } else {
                PriceTrend::Falling
            }
        }
        (Some(_), None) => PriceTrend::Rising,
        (None, Some(_)) => PriceTrend::Falling,
        (None, None) => PriceTrend::Stable,
    }
}

fn parse_confidence(text: &str) -> u8 {
    CONFIDENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map_or(50, |pct| pct.min(100) as u8)
}

fn parse_daily_prices(text: &str) -> Vec<f64> {
    let mut days: Vec<(u32, f64)> = DAILY_PRICE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let day = caps.get(1)?.as_str().parse::<u32>().ok()?;
            let price = caps.get(2)?.as_str().replace(',', "").parse::<f64>().ok()?;
            Some((day, price))
        })
        .collect();
    days.sort_by_key(|&(day, _)| day);
    days.into_iter().map(|(_, price)| price).collect()
}
