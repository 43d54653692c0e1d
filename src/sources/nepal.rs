//! realestateinnepal.com listing scraper.
//!
//! Search result pages render each property as an `<article>` (or a
//! `.property-item` / `.listing-item` card on older templates). Cards carry a
//! property code, a heading, a price such as `NPR 2,50,00,000` and a free-text
//! block like `3 Bed 2 Bath 1200 sqft`.
//!
//! Every card is kept, even without a price: the site regularly lists
//! "price on request" properties that downstream stages still want.

use super::{RawListing, SourceStrategy, first_text, node_text};
use crate::normalize::{AreaUnit, PriceGrammar, absolutize_url};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use url::Url;

pub const KEY: &str = "realestateinnepal";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static CARD: Lazy<Selector> = Lazy::new(|| selector("article, .property-item, .listing-item"));
static CODE: Lazy<Selector> = Lazy::new(|| selector("code, .property-code"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h3, h4, .property-title"));
static PRICE: Lazy<Selector> = Lazy::new(|| selector(".price, [class*='price'], strong"));
static LOCATION: Lazy<Selector> = Lazy::new(|| selector(".location, [class*='location'], p"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static NEXT: Lazy<Selector> = Lazy::new(|| selector("a[rel='next'], a.next, .next > a"));

#[derive(Debug, Default)]
pub struct RealEstateInNepal;

impl RealEstateInNepal {
    pub fn new() -> Self {
        Self
    }
}

pub fn strategy() -> Arc<dyn SourceStrategy> {
    Arc::new(RealEstateInNepal::new())
}

impl SourceStrategy for RealEstateInNepal {
    fn name(&self) -> &'static str {
        KEY
    }

    fn listing_selector(&self) -> &Selector {
        &CARD
    }

    fn read_node(&self, node: ElementRef<'_>) -> Option<RawListing> {
        let details_text = node_text(node);
        if details_text.is_empty() {
            return None;
        }
        let code = first_text(node, &CODE);
        Some(RawListing {
            id: (!code.is_empty()).then_some(code),
            title: first_text(node, &TITLE),
            price_text: first_text(node, &PRICE),
            location: first_text(node, &LOCATION),
            href: node
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
            details_text,
        })
    }

    fn price_grammar(&self) -> PriceGrammar {
        PriceGrammar::Symbol
    }

    fn area_unit(&self) -> AreaUnit {
        AreaUnit::SquareFeet
    }

    fn id_prefix(&self) -> &'static str {
        "nepal"
    }

    fn next_page(&self, document: &Html, page_url: &Url) -> Option<Url> {
        document
            .select(&NEXT)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| absolutize_url(page_url, href))
    }
}
