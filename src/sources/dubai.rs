//! realestate.com.au international (Dubai) listing scraper.
//!
//! The Dubai results page links every property with an anchor whose `href`
//! contains `/international/ae/`; the anchor wraps the whole card. Prices are
//! printed with an ISO code first (`AED 934,000`, `AUD $393,161`) and floor
//! area is given in square meters. Bathroom counts are not part of the
//! listing data, so they stay 0.
//!
//! The same href pattern also matches breadcrumb and navigation links, so
//! records without a title or a price are dropped.

use super::{CompletenessPolicy, RawListing, SourceStrategy, first_text, node_text};
use crate::normalize::{AreaUnit, PriceGrammar, clean_text};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::sync::Arc;

pub const KEY: &str = "realestate-au-dubai";

const LISTING_PATH: &str = "/international/ae/";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static CARD: Lazy<Selector> = Lazy::new(|| selector("a[href*='/international/ae/']"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h3, h4, .property-title"));
static PRICE: Lazy<Selector> = Lazy::new(|| selector("[class*='price'], .price, strong"));
static LOCATION: Lazy<Selector> =
    Lazy::new(|| selector(".location, [class*='location'], .address"));
static DUBAI_AREA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z][A-Za-z\s]*),\s*Dubai").unwrap());

#[derive(Debug, Default)]
pub struct RealEstateAuDubai;

impl RealEstateAuDubai {
    pub fn new() -> Self {
        Self
    }
}

pub fn strategy() -> Arc<dyn SourceStrategy> {
    Arc::new(RealEstateAuDubai::new())
}

/// Location from a dedicated element, else the `<district>, Dubai` pattern in the card text.
fn location(node: ElementRef<'_>, text: &str) -> String {
    let location = first_text(node, &LOCATION);
    if !location.is_empty() {
        return location;
    }
    DUBAI_AREA_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .unwrap_or_default()
}

impl SourceStrategy for RealEstateAuDubai {
    fn name(&self) -> &'static str {
        KEY
    }

    fn listing_selector(&self) -> &Selector {
        &CARD
    }

    fn read_node(&self, node: ElementRef<'_>) -> Option<RawListing> {
        let href = node.value().attr("href")?;
        if !href.contains(LISTING_PATH) {
            return None;
        }
        let details_text = node_text(node);
        let heading = first_text(node, &TITLE);
        let title = if heading.is_empty() {
            details_text.clone()
        } else {
            heading
        };
        Some(RawListing {
            id: None,
            title,
            price_text: first_text(node, &PRICE),
            location: location(node, &details_text),
            href: Some(href.to_string()),
            details_text,
        })
    }

    fn price_grammar(&self) -> PriceGrammar {
        PriceGrammar::IsoCode
    }

    fn area_unit(&self) -> AreaUnit {
        AreaUnit::SquareMeters
    }

    fn id_prefix(&self) -> &'static str {
        "dubai"
    }

    fn reports_bathrooms(&self) -> bool {
        false
    }

    fn completeness(&self) -> CompletenessPolicy {
        CompletenessPolicy {
            require_title: true,
            require_price: true,
        }
    }
}
