//! Per-site extraction strategies.
//!
//! Each supported website has one [`SourceStrategy`] implementation that knows
//! where listings live in the markup and which text grammars the site uses.
//! Strategies only *read* raw text ([`RawListing`]); turning that text into a
//! [`Listing`] is shared by all of them in [`extract_page`], so raw strings
//! never leave this module.
//!
//! # Supported Sources
//!
//! | Strategy key | Module | Price grammar | Area unit | Completeness |
//! |--------------|--------|---------------|-----------|--------------|
//! | `realestateinnepal` | [`nepal`] | symbol (`NPR 2,500,000`) | sqft | keep all |
//! | `realestate-au-dubai` | [`dubai`] | ISO code (`AED 934,000`) | m² | title and price required |
//!
//! Adding a site means adding a module and one [`StrategyRegistry::register`] call.

use crate::config::SourceConfig;
use crate::error::{Result, ScrapeError};
use crate::models::Listing;
use crate::normalize::{
    AreaUnit, IdGenerator, PriceGrammar, absolutize_url, clean_text, extract_bathrooms,
    extract_bedrooms,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use url::Url;

pub mod dubai;
pub mod nepal;

static REL_NEXT: Lazy<Selector> = Lazy::new(|| Selector::parse("a[rel='next']").unwrap());

/// Raw text read from one listing node, before normalization.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawListing {
    pub id: Option<String>,
    pub title: String,
    pub price_text: String,
    pub location: String,
    /// Free text the counts and the area are mined from.
    pub details_text: String,
    pub href: Option<String>,
}

/// Which records a source considers worth keeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletenessPolicy {
    pub require_title: bool,
    pub require_price: bool,
}

impl CompletenessPolicy {
    pub const KEEP_ALL: Self = Self {
        require_title: false,
        require_price: false,
    };

    pub fn admits(&self, listing: &Listing) -> bool {
        (!self.require_title || !listing.title.is_empty())
            && (!self.require_price || listing.has_price())
    }
}

/// Extraction policy for one website.
pub trait SourceStrategy: Send + Sync + fmt::Debug {
    /// Registry key.
    fn name(&self) -> &'static str;

    /// Selector matching one node per listing.
    fn listing_selector(&self) -> &Selector;

    /// Read raw fields from a listing node, or `None` if the node is unusable.
    fn read_node(&self, node: ElementRef<'_>) -> Option<RawListing>;

    fn price_grammar(&self) -> PriceGrammar;

    fn area_unit(&self) -> AreaUnit;

    /// Prefix of generated ids for listings without a source id.
    fn id_prefix(&self) -> &'static str;

    fn completeness(&self) -> CompletenessPolicy {
        CompletenessPolicy::KEEP_ALL
    }

    /// Whether the site's cards carry a bathroom count; when not, it stays 0.
    fn reports_bathrooms(&self) -> bool {
        true
    }

    /// Address of the following results page, if the page links one.
    ///
    /// `page_url` is the address `document` was fetched from.
    fn next_page(&self, document: &Html, page_url: &Url) -> Option<Url> {
        document
            .select(&REL_NEXT)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| absolutize_url(page_url, href))
    }
}

/// Where the current page came from and who hands out fallback ids.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub source: &'a SourceConfig,
    pub page_url: &'a Url,
    pub ids: &'a IdGenerator,
}

/// Result of extracting one page.
#[derive(Debug, Default)]
pub struct PageExtract {
    pub listings: Vec<Listing>,
    /// Nodes the strategy could not read.
    pub skipped: usize,
    /// Listings rejected by the completeness policy.
    pub dropped: usize,
    pub next_page: Option<Url>,
}

/// All text below `node`, whitespace-collapsed.
pub fn node_text(node: ElementRef<'_>) -> String {
    clean_text(&node.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first descendant matching `selector`, or `""`.
pub fn first_text(node: ElementRef<'_>, selector: &Selector) -> String {
    node.select(selector).next().map(node_text).unwrap_or_default()
}

/// Parse a fetched body as an HTML document.
///
/// `scraper` recovers from any markup error, so only bodies that cannot be
/// HTML at all (empty, or without a single tag) are rejected.
pub fn parse_document(html: &str, page_url: &Url) -> Result<Html> {
    if !html.contains('<') {
        return Err(ScrapeError::Parse {
            url: page_url.to_string(),
            reason: if html.trim().is_empty() {
                "empty body".to_string()
            } else {
                "body is not HTML".to_string()
            },
        });
    }
    Ok(Html::parse_document(html))
}

/// Turn every listing node of `document` into a normalized [`Listing`].
///
/// Never fails: unreadable nodes are counted in [`PageExtract::skipped`]. A
/// node nested inside another matched node is ignored so overlapping
/// selectors do not emit the same card twice.
pub fn extract_document(
    strategy: &dyn SourceStrategy,
    document: &Html,
    ctx: &ExtractContext<'_>,
) -> PageExtract {
    let nodes: Vec<ElementRef<'_>> = document.select(strategy.listing_selector()).collect();
    let matched: HashSet<_> = nodes.iter().map(|n| n.id()).collect();

    let mut extract = PageExtract::default();
    let mut index = 0usize;
    for node in nodes {
        if node.ancestors().any(|a| matched.contains(&a.id())) {
            continue;
        }
        let Some(raw) = strategy.read_node(node) else {
            extract.skipped += 1;
            continue;
        };
        let listing = normalize_raw(strategy, raw, ctx, index);
        index += 1;
        if strategy.completeness().admits(&listing) {
            extract.listings.push(listing);
        } else {
            extract.dropped += 1;
        }
    }
    extract.next_page = strategy.next_page(document, ctx.page_url);
    extract
}

/// [`parse_document`] followed by [`extract_document`].
pub fn extract_page(
    strategy: &dyn SourceStrategy,
    html: &str,
    ctx: &ExtractContext<'_>,
) -> Result<PageExtract> {
    let document = parse_document(html, ctx.page_url)?;
    Ok(extract_document(strategy, &document, ctx))
}

fn normalize_raw(
    strategy: &dyn SourceStrategy,
    raw: RawListing,
    ctx: &ExtractContext<'_>,
    index: usize,
) -> Listing {
    let scraped_at = Utc::now();
    let title = clean_text(&raw.title);
    let location = clean_text(&raw.location);

    let (mut price, mut currency) = strategy.price_grammar().parse(&raw.price_text);
    if !(price.is_finite() && price > 0.0) {
        price = 0.0;
        currency.clear();
    }

    let description = if !location.is_empty() && location != title {
        format!("{title} - {location}")
    } else {
        title.clone()
    };

    let url = raw
        .href
        .as_deref()
        .and_then(|href| absolutize_url(&ctx.source.base_url, href))
        .unwrap_or_else(|| ctx.page_url.clone());

    let id = raw
        .id
        .map(|id| clean_text(&id))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ctx.ids.next_id(strategy.id_prefix(), scraped_at, index));

    Listing {
        id,
        title,
        price,
        currency,
        location,
        description,
        bedrooms: extract_bedrooms(&raw.details_text),
        bathrooms: if strategy.reports_bathrooms() {
            extract_bathrooms(&raw.details_text)
        } else {
            0
        },
        area_sq_ft: strategy.area_unit().extract_sq_ft(&raw.details_text),
        url: url.to_string(),
        scraped_at,
        source: ctx.source.id.clone(),
    }
}

type Constructor = fn() -> Arc<dyn SourceStrategy>;

/// Maps strategy keys to their implementations.
pub struct StrategyRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every strategy shipped in this crate.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(nepal::KEY, nepal::strategy);
        registry.register(dubai::KEY, dubai::strategy);
        registry
    }

    pub fn register(&mut self, key: &'static str, constructor: Constructor) {
        self.constructors.insert(key, constructor);
    }

    pub fn create(&self, key: &str) -> Option<Arc<dyn SourceStrategy>> {
        self.constructors.get(key).map(|ctor| ctor())
    }

    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.constructors.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Resolve the strategy of every source, failing on the first unknown key.
    pub fn resolve(&self, sources: &[SourceConfig]) -> Result<Vec<Arc<dyn SourceStrategy>>> {
        sources
            .iter()
            .map(|s| {
                self.create(&s.strategy).ok_or_else(|| {
                    ScrapeError::Config(format!(
                        "source {} uses unknown strategy {:?} (known: {})",
                        s.id,
                        s.strategy,
                        self.keys().join(", ")
                    ))
                })
            })
            .collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::HarvestConfig;

    pub(crate) fn nepal_source() -> SourceConfig {
        HarvestConfig::builtin().sources.remove(0)
    }

    #[derive(Debug)]
    struct Cards;

    static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse(".card").unwrap());
    static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").unwrap());
    static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".price").unwrap());

    impl SourceStrategy for Cards {
        fn name(&self) -> &'static str {
            "cards"
        }
        fn listing_selector(&self) -> &Selector {
            &CARD
        }
        fn read_node(&self, node: ElementRef<'_>) -> Option<RawListing> {
            let text = node_text(node);
            if text == "broken" {
                return None;
            }
            Some(RawListing {
                title: first_text(node, &TITLE),
                price_text: first_text(node, &PRICE),
                details_text: text,
                href: node.value().attr("data-href").map(str::to_string),
                ..RawListing::default()
            })
        }
        fn price_grammar(&self) -> PriceGrammar {
            PriceGrammar::Symbol
        }
        fn area_unit(&self) -> AreaUnit {
            AreaUnit::SquareFeet
        }
        fn id_prefix(&self) -> &'static str {
            "cards"
        }
        fn completeness(&self) -> CompletenessPolicy {
            CompletenessPolicy {
                require_title: true,
                require_price: false,
            }
        }
    }

    fn cards() -> Arc<dyn SourceStrategy> {
        Arc::new(Cards)
    }

    fn run(html: &str) -> Result<PageExtract> {
        let source = nepal_source();
        let page_url = source.page_urls().unwrap().remove(0);
        let ids = IdGenerator::new();
        let ctx = ExtractContext {
            source: &source,
            page_url: &page_url,
            ids: &ids,
        };
        extract_page(&Cards, html, &ctx)
    }

    #[test]
    fn test_extract_page_skips_broken_and_incomplete_nodes() {
        let html = r#"<html><body>
            <div class="card" data-href="/p/1"><h3>One</h3><span class="price">NPR 10</span></div>
            <div class="card">broken</div>
            <div class="card"><span class="price">NPR 20</span></div>
            <div class="card"><h3>Three</h3><span class="price">call us</span></div>
        </body></html>"#;

        let extract = run(html).unwrap();
        assert_eq!(extract.listings.len(), 2);
        assert_eq!(extract.skipped, 1);
        assert_eq!(extract.dropped, 1);

        let one = &extract.listings[0];
        assert_eq!(one.url, "https://www.realestateinnepal.com/p/1");
        assert_eq!((one.price, one.currency.as_str()), (10.0, "NPR"));

        let three = &extract.listings[1];
        assert_eq!((three.price, three.currency.as_str()), (0.0, ""));
        assert!(three.url.starts_with("https://www.realestateinnepal.com/search-result/"));
        assert_ne!(one.id, three.id);
        assert!(one.id.starts_with("cards-"));
    }

    #[test]
    fn test_extract_page_ignores_nested_matches() {
        let html = r#"<div class="card"><h3>Outer</h3><div class="card"><h3>Inner</h3></div></div>"#;
        let extract = run(html).unwrap();
        assert_eq!(extract.listings.len(), 1);
        assert_eq!(extract.listings[0].title, "Outer");
    }

    #[test]
    fn test_extract_page_rejects_non_html() {
        assert!(matches!(run("   "), Err(ScrapeError::Parse { .. })));
        assert!(matches!(run("{\"ok\":true}"), Err(ScrapeError::Parse { .. })));
    }

    #[test]
    fn test_default_next_page() {
        let html = r#"<html><body><a rel="next" href="?page=2">Next</a></body></html>"#;
        let extract = run(html).unwrap();
        assert_eq!(
            extract.next_page.unwrap().as_str(),
            "https://www.realestateinnepal.com/search-result/page/1/?page=2"
        );
    }

    #[test]
    fn test_description_fallbacks() {
        let source = nepal_source();
        let page_url = source.base_url.clone();
        let ids = IdGenerator::new();
        let ctx = ExtractContext {
            source: &source,
            page_url: &page_url,
            ids: &ids,
        };
        let raw = RawListing {
            id: Some("  NP-77 ".to_string()),
            title: "Villa".to_string(),
            location: "Villa".to_string(),
            ..RawListing::default()
        };
        let listing = normalize_raw(&Cards, raw, &ctx, 0);
        assert_eq!(listing.description, "Villa");
        assert_eq!(listing.id, "NP-77");
        assert_eq!(listing.source, "realestateinnepal.com");

        let raw = RawListing {
            title: "Villa".to_string(),
            location: "Lalitpur".to_string(),
            ..RawListing::default()
        };
        let listing = normalize_raw(&Cards, raw, &ctx, 1);
        assert_eq!(listing.description, "Villa - Lalitpur");
    }

    #[test]
    fn test_registry() {
        let registry = StrategyRegistry::new();
        assert_eq!(registry.keys(), vec!["realestate-au-dubai", "realestateinnepal"]);
        assert_eq!(registry.create("realestateinnepal").unwrap().name(), "realestateinnepal");
        assert!(registry.create("zillow").is_none());

        let mut sources = HarvestConfig::builtin().sources;
        assert_eq!(registry.resolve(&sources).unwrap().len(), 2);
        sources[0].strategy = "zillow".to_string();
        assert!(matches!(registry.resolve(&sources), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn test_registry_register_custom() {
        let mut registry = StrategyRegistry::empty();
        registry.register("cards", cards);
        assert_eq!(registry.keys(), vec!["cards"]);
    }
}
