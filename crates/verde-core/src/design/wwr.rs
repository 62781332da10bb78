//! Window-to-wall ratio normalization.

use once_cell::sync::Lazy;
use regex::Regex;

static PERCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:%|percent\b|per\s*cent\b)").expect("valid percent regex")
});
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d*\.?\d+)\s*$").expect("valid number regex"));

/// Normalizes a numeric WWR to `[0, 1]`.
///
/// Values above 1 and up to 100 are read as percentages.
pub fn normalize_wwr(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value <= 1.0 {
        Some(value)
    } else if value <= 100.0 {
        Some(value / 100.0)
    } else {
        None
    }
}

/// Parses a WWR written as `"30%"`, `"30 percent"`, `"0.3"` or `"30"`.
pub fn parse_wwr(text: &str) -> Option<f64> {
    if let Some(caps) = PERCENT.captures(text) {
        let pct: f64 = caps[1].parse().ok()?;
        return if pct <= 100.0 { Some(pct / 100.0) } else { None };
    }
    let caps = NUMBER.captures(text)?;
    normalize_wwr(caps[1].parse().ok()?)
}

/// Finds a percentage anywhere in a sentence ("... 30% windows ...").
pub fn find_percentage(text: &str) -> Option<f64> {
    PERCENT
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|pct| *pct <= 100.0)
        .map(|pct| pct / 100.0)
}
