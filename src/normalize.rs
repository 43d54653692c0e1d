//! Field normalizers turning raw listing text into typed values.
//!
//! Every function here is total: malformed or missing input degrades to the
//! field's unknown value (`0`, `0.0`, `""` or `None`) instead of failing, so
//! a bad price never costs the bedrooms of the same record.
//!
//! Regexes are compiled once and shared; nothing here carries mutable state
//! except [`IdGenerator`], whose only job is handing out unique sequence numbers.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Square feet per square meter.
pub const SQ_FT_PER_SQ_M: f64 = 10.764;

static SYMBOL_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<cur>[A-Z]{2,4}|Rs\.?|[$€£¥₹])?\s*(?P<num>\d+(?:\.\d+)?)").unwrap()
});
static ISO_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<cur>[A-Z]{3})\s*[$€£¥]?\s*(?P<num>\d+(?:\.\d+)?)").unwrap()
});
// The leading group keeps `2.5 Baths` from matching on its fractional digits.
static BEDROOM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[^\d.])(\d+)(?:\.\d+)?\s*(?:bed|bhk)").unwrap());
static BATHROOM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[^\d.])(\d+)(?:\.\d+)?\s*bath").unwrap());
static SQ_FT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:sq\.?\s*ft|sqft|ft²|ft2)").unwrap()
});
static SQ_M_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:m²|m2\b|sq\.?\s*m\b|sqm\b)").unwrap()
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// How a source prints its asking price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceGrammar {
    /// Optional code or symbol before the number: `NPR 2,500,000`, `$ 120,000`, `Rs. 95,00,000`.
    Symbol,
    /// Mandatory 3-letter ISO code, optionally followed by a symbol: `AED 934,000`, `AUD $393,161`.
    IsoCode,
}

impl PriceGrammar {
    pub fn parse(&self, text: &str) -> (f64, String) {
        match self {
            PriceGrammar::Symbol => parse_price(text),
            PriceGrammar::IsoCode => parse_iso_price(text),
        }
    }
}

/// The area unit a source reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaUnit {
    SquareFeet,
    SquareMeters,
}

impl AreaUnit {
    /// Extract an area in this unit from `text` and return it in square feet.
    pub fn extract_sq_ft(&self, text: &str) -> f64 {
        let text = strip_grouping(text);
        let (re, factor) = match self {
            AreaUnit::SquareFeet => (&*SQ_FT_RE, 1.0),
            AreaUnit::SquareMeters => (&*SQ_M_RE, SQ_FT_PER_SQ_M),
        };
        capture_f64(re, &text)
            .map(|v| v * factor)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

fn strip_grouping(text: &str) -> String {
    text.replace(',', "")
}

fn capture_f64(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn price_with(re: &Regex, text: &str) -> (f64, String) {
    let text = strip_grouping(text);
    let Some(caps) = re.captures(&text) else {
        return (0.0, String::new());
    };
    match caps["num"].parse::<f64>() {
        Ok(price) => {
            let currency = caps
                .name("cur")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            (price, currency)
        }
        Err(_) => (0.0, String::new()),
    }
}

/// Parse a price with an optional leading currency code or symbol.
///
/// Grouping commas are removed before matching. Returns `(0.0, "")` when no
/// numeric literal is present.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_price("NPR 2,500,000"), (2_500_000.0, "NPR".to_string()));
/// assert_eq!(parse_price("Price on request"), (0.0, String::new()));
/// ```
pub fn parse_price(text: &str) -> (f64, String) {
    price_with(&SYMBOL_PRICE_RE, text)
}

/// Parse a price that starts with a 3-letter ISO currency code.
pub fn parse_iso_price(text: &str) -> (f64, String) {
    price_with(&ISO_PRICE_RE, text)
}

fn capture_count(re: &Regex, text: &str) -> u32 {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Bedroom count from text like `"3 Bed"`, `"4 Bedrooms"` or `"2BHK"`; 0 when absent.
///
/// Fractional counts are truncated (`"1.5 Bed"` is 1).
pub fn extract_bedrooms(text: &str) -> u32 {
    capture_count(&BEDROOM_RE, text)
}

/// Bathroom count from text like `"2 Bath"`; 0 when absent.
pub fn extract_bathrooms(text: &str) -> u32 {
    capture_count(&BATHROOM_RE, text)
}

/// Area in square feet from whichever unit the text carries.
///
/// An explicit square-feet figure wins over a metric one.
pub fn extract_area_sq_ft(text: &str) -> f64 {
    let sq_ft = AreaUnit::SquareFeet.extract_sq_ft(text);
    if sq_ft > 0.0 {
        sq_ft
    } else {
        AreaUnit::SquareMeters.extract_sq_ft(text)
    }
}

/// Resolve `href` against `base`, keeping only http(s) targets.
pub fn absolutize_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Hands out run-unique fallback identifiers.
///
/// Ids combine the capture instant, a sequence number shared by every worker
/// of the run and the node's position on its page. The sequence alone makes
/// them unique, so clock resolution does not matter.
#[derive(Debug, Default)]
pub struct IdGenerator {
    seq: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, prefix: &str, captured_at: DateTime<Utc>, index: usize) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let nanos = captured_at.timestamp_nanos_opt().unwrap_or_default();
        format!("{prefix}-{nanos}-{seq}-{index}")
    }
}
