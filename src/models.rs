//! Data models for normalized listings.
//!
//! This module defines the record every source strategy produces:
//! - [`Listing`]: One normalized real-estate listing, ready for serialization
//!
//! Field names are serialized in camelCase to match the artifact schema that
//! downstream processing stages read (`areaSqFt`, `scrapedAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized real-estate listing.
///
/// Listings are built once by a source strategy from one page fragment and are
/// never mutated afterwards; ownership moves from the page worker to the
/// collector through the aggregation channel.
///
/// # Unknown values
///
/// * `price == 0.0` together with `currency == ""` means the price could not be parsed
/// * `area_sq_ft == 0.0` means the area is unknown
/// * `bedrooms == 0` / `bathrooms == 0` mean the count was not reported
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Source-provided id when present, otherwise a run-unique fallback.
    pub id: String,
    pub title: String,
    /// Numeric price in `currency`; `0.0` when unparsed.
    pub price: f64,
    /// ISO code or symbol as printed by the source; empty when unknown.
    pub currency: String,
    pub location: String,
    /// Either a dedicated description or `"{title} - {location}"`.
    pub description: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    /// Area in square feet; `0.0` when unknown.
    pub area_sq_ft: f64,
    /// Absolute URL of the listing detail page.
    pub url: String,
    /// Instant the listing was extracted, in UTC.
    pub scraped_at: DateTime<Utc>,
    /// Identifier of the configured source that produced this listing.
    pub source: String,
}

impl Listing {
    /// Whether the price was successfully parsed.
    pub fn has_price(&self) -> bool {
        self.price > 0.0
    }
}
