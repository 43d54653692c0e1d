//! Run-level orchestration.
//!
//! The [`Coordinator`] starts one producer task per configured source, waits
//! for all of them (barrier), then closes the aggregation channel and takes
//! the collector's sequence. Source-level failures only show up in the
//! [`RunReport`]; the only fatal outcomes are a bad configuration and a
//! collector task that died.
//!
//! ```text
//! Coordinator ──spawn──> source task 1 ──pages──┐
//!             ──spawn──> source task 2 ──pages──┼──> ListingSink ──> Collector
//!             ──spawn──> source task N ──pages──┘
//! ```

use crate::collector::Collector;
use crate::config::HarvestConfig;
use crate::error::{Result, ScrapeError};
use crate::fetcher::{Fetch, MinIntervalGate, Throttled};
use crate::models::Listing;
use crate::normalize::IdGenerator;
use crate::sources::StrategyRegistry;
use crate::worker::{SourceReport, run_source};
use futures::future::join_all;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Bounded buffer between producers and the collector.
const CHANNEL_CAPACITY: usize = 256;

/// Result of a complete run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub listings: Vec<Listing>,
    pub sources: Vec<SourceReport>,
    /// Listings discarded because their id was already collected.
    pub duplicates: usize,
}

impl RunReport {
    pub fn pages_ok(&self) -> usize {
        self.sources.iter().map(|s| s.pages_ok).sum()
    }

    pub fn pages_failed(&self) -> usize {
        self.sources.iter().map(|s| s.pages_failed).sum()
    }

    /// Listings in the final sequence, per source id.
    pub fn counts_by_source(&self) -> HashMap<&str, usize> {
        self.listings.iter().counts_by(|l| l.source.as_str())
    }
}

/// Drives every configured source to completion.
pub struct Coordinator<F> {
    fetcher: Arc<F>,
    registry: StrategyRegistry,
    cancel: CancellationToken,
}

impl<F: Fetch + 'static> Coordinator<F> {
    pub fn new(fetcher: F, registry: StrategyRegistry, cancel: CancellationToken) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            registry,
            cancel,
        }
    }

    /// Scrape every source in `config` and return the collected listings.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Config`] if the configuration is invalid or names an
    ///   unknown strategy; nothing is fetched in that case
    /// - [`ScrapeError::Task`] if the collector task panicked
    #[instrument(level = "info", skip_all, fields(sources = config.sources.len()))]
    pub async fn run(&self, config: &HarvestConfig) -> Result<RunReport> {
        config.validate()?;
        let strategies = self.registry.resolve(&config.sources)?;

        let (sink, collector) = Collector::channel(CHANNEL_CAPACITY);
        let collector = collector.spawn();
        let ids = Arc::new(IdGenerator::new());

        let handles: Vec<_> = config
            .sources
            .iter()
            .zip(strategies)
            .map(|(source, strategy)| {
                let gate = MinIntervalGate::new(
                    source.min_interval(),
                    source.jitter(),
                    self.cancel.clone(),
                );
                let fetcher = Throttled::new(Arc::clone(&self.fetcher), gate);
                let id = source.id.clone();
                let handle = tokio::spawn(run_source(
                    Arc::new(source.clone()),
                    strategy,
                    fetcher,
                    Arc::clone(&ids),
                    sink.clone(),
                    self.cancel.clone(),
                ));
                (id, handle)
            })
            .collect();
        // Only the producers hold senders now.
        drop(sink);
        info!(count = handles.len(), "Source tasks started");

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut report = RunReport::default();
        for (source, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(source_report) => report.sources.push(source_report),
                Err(e) => {
                    error!(%source, error = %e, "Source task failed");
                    report.sources.push(SourceReport {
                        source,
                        pages_failed: 1,
                        ..SourceReport::default()
                    });
                }
            }
        }

        let collected = collector.await.map_err(ScrapeError::Task)?;
        report.listings = collected.listings;
        report.duplicates = collected.duplicates;
        info!(
            count = report.listings.len(),
            pages_ok = report.pages_ok(),
            pages_failed = report.pages_failed(),
            "All sources finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticFetcher;
    use crate::outputs::json::write_listings;
    use std::collections::HashSet;

    const PAGE: &str = r#"<html><body>
        <article><h3>House</h3><span class="price">NPR 2,500,000</span>
        <p>Kathmandu</p><div>3 Bed 2 Bath 1200 sqft</div></article>
    </body></html>"#;

    const DUBAI_PAGE: &str = r#"<html><body>
        <a href="/international/ae/dubai/marina/1"><h3>Marina Flat</h3>
        <span class="price">AED 934,000</span><span>1 Bed 60 m2</span></a>
    </body></html>"#;

    fn config(pages: usize) -> HarvestConfig {
        let mut config = HarvestConfig::builtin();
        config.override_min_interval(0);
        config.sources[0].pages = pages;
        config
    }

    #[tokio::test]
    async fn test_two_pages_yield_two_listings_with_distinct_ids() {
        let config = config(2);
        let urls = config.sources[0].page_urls().unwrap();
        let fetcher = StaticFetcher::new()
            .page(urls[0].as_str(), PAGE)
            .page(urls[1].as_str(), PAGE);
        let coordinator =
            Coordinator::new(fetcher, StrategyRegistry::new(), CancellationToken::new());

        let report = coordinator.run(&config).await.unwrap();
        let nepal: Vec<_> = report
            .listings
            .iter()
            .filter(|l| l.source == "realestateinnepal.com")
            .collect();
        assert_eq!(nepal.len(), 2);
        assert_ne!(nepal[0].id, nepal[1].id);
        for listing in nepal {
            assert_eq!((listing.bedrooms, listing.bathrooms), (3, 2));
            assert_eq!(listing.area_sq_ft, 1200.0);
            assert_eq!(listing.price, 2_500_000.0);
            assert_eq!(listing.currency, "NPR");
        }
    }

    #[tokio::test]
    async fn test_run_writes_readable_artifact() {
        let mut config = config(2);
        config.retain_sources(&["realestateinnepal.com".to_string()]).unwrap();
        let urls = config.sources[0].page_urls().unwrap();
        let fetcher = StaticFetcher::new()
            .page(urls[0].as_str(), PAGE)
            .page(urls[1].as_str(), PAGE);
        let coordinator =
            Coordinator::new(fetcher, StrategyRegistry::new(), CancellationToken::new());
        let report = coordinator.run(&config).await.unwrap();

        let dir = std::env::temp_dir().join(format!(
            "listing_harvest_coordinator_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("properties.json");
        write_listings(&report.listings, &path).await.unwrap();

        let back: Vec<Listing> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 2);
        assert_ne!(back[0].id, back[1].id);
        assert!(back.iter().all(|l| l.area_sq_ft == 1200.0 && l.currency == "NPR"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_page_does_not_abort_run() {
        let mut config = config(3);
        config.retain_sources(&["realestateinnepal.com".to_string()]).unwrap();
        let urls = config.sources[0].page_urls().unwrap();
        let fetcher = StaticFetcher::new()
            .page(urls[0].as_str(), PAGE)
            .status(urls[1].as_str(), 404)
            .page(urls[2].as_str(), PAGE);
        let coordinator =
            Coordinator::new(fetcher, StrategyRegistry::new(), CancellationToken::new());

        let report = coordinator.run(&config).await.unwrap();
        assert_eq!(report.listings.len(), 2);
        assert_eq!(report.pages_ok(), 2);
        assert_eq!(report.pages_failed(), 1);
    }

    #[tokio::test]
    async fn test_sources_run_independently() {
        let config = config(1);
        let nepal = config.sources[0].page_urls().unwrap();
        let dubai = config.sources[1].page_urls().unwrap();
        let fetcher = StaticFetcher::new()
            .page(nepal[0].as_str(), PAGE)
            .page(dubai[0].as_str(), DUBAI_PAGE);
        let coordinator =
            Coordinator::new(fetcher, StrategyRegistry::new(), CancellationToken::new());

        let report = coordinator.run(&config).await.unwrap();
        let counts = report.counts_by_source();
        assert_eq!(counts.get("realestateinnepal.com"), Some(&1));
        assert_eq!(counts.get("realestate.com.au/dubai"), Some(&1));
        assert_eq!(report.pages_ok(), 2);
        assert_eq!(report.pages_failed(), 0);

        let ids: HashSet<_> = report.listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids.len(), report.listings.len());
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_fatal_before_fetching() {
        let mut config = config(1);
        config.sources[1].strategy = "zillow".to_string();
        let fetcher = Arc::new(StaticFetcher::new());
        let coordinator = Coordinator::new(
            Arc::clone(&fetcher),
            StrategyRegistry::new(),
            CancellationToken::new(),
        );

        let err = coordinator.run(&config).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)));
        assert_eq!(fetcher.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_still_reports() {
        let config = config(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let coordinator = Coordinator::new(StaticFetcher::new(), StrategyRegistry::new(), cancel);

        let report = coordinator.run(&config).await.unwrap();
        assert!(report.listings.is_empty());
        assert_eq!(report.sources.len(), 2);
    }
}
