//! Page workers and the per-source page loop.
//!
//! A [`PageWorker`] processes one unit of work (one page of one source):
//!
//! ```text
//! Pending -> Fetching -> Parsing -> Extracting -> Done
//!               |           |
//!               +-----------+------> Failed
//! ```
//!
//! Failures while fetching or parsing end that unit only; they are logged and
//! reported in the [`PageOutcome`], never propagated. Extraction cannot fail:
//! unreadable listing nodes are skipped and the rest of the page is kept.
//!
//! [`run_source`] drives the pages of one source sequentially, which is what
//! lets the per-source rate limit and next-page discovery work.

use crate::collector::ListingSink;
use crate::config::SourceConfig;
use crate::error::ScrapeError;
use crate::fetcher::Fetch;
use crate::normalize::IdGenerator;
use crate::sources::{ExtractContext, SourceStrategy, extract_document, parse_document};
use crate::utils::truncate_for_log;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Pending,
    Fetching,
    Parsing,
    Extracting,
    Done,
    Failed,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageState::Pending => "pending",
            PageState::Fetching => "fetching",
            PageState::Parsing => "parsing",
            PageState::Extracting => "extracting",
            PageState::Done => "done",
            PageState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What happened to one unit of work.
#[derive(Debug)]
pub struct PageOutcome {
    pub url: Url,
    /// `Done` or `Failed`.
    pub state: PageState,
    /// Stage the unit was in when it failed.
    pub failed_at: Option<PageState>,
    pub error: Option<ScrapeError>,
    /// Listings handed to the collector.
    pub delivered: usize,
    pub next_page: Option<Url>,
}

/// Processes one page of one source.
pub struct PageWorker<'a, F> {
    fetcher: &'a F,
    strategy: &'a dyn SourceStrategy,
    source: &'a SourceConfig,
    ids: &'a IdGenerator,
    sink: &'a ListingSink,
    state: PageState,
}

impl<'a, F: Fetch> PageWorker<'a, F> {
    pub fn new(
        fetcher: &'a F,
        strategy: &'a dyn SourceStrategy,
        source: &'a SourceConfig,
        ids: &'a IdGenerator,
        sink: &'a ListingSink,
    ) -> Self {
        Self {
            fetcher,
            strategy,
            source,
            ids,
            sink,
            state: PageState::Pending,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    fn enter(&mut self, next: PageState) {
        debug!(source = %self.source.id, from = %self.state, to = %next, "Page state");
        self.state = next;
    }

    fn fail(mut self, url: Url, page: usize, e: ScrapeError) -> PageOutcome {
        let failed_at = self.state;
        self.enter(PageState::Failed);
        error!(source = %self.source.id, page, %url, stage = %failed_at, error = %e, "Page failed; skipping");
        PageOutcome {
            url,
            state: PageState::Failed,
            failed_at: Some(failed_at),
            error: Some(e),
            delivered: 0,
            next_page: None,
        }
    }

    /// Fetch, parse and extract `url`, delivering its listings to the collector.
    #[instrument(level = "debug", skip_all, fields(source = %self.source.id, page = page, %url))]
    pub async fn run(mut self, url: Url, page: usize) -> PageOutcome {
        info!(source = %self.source.id, page, %url, "Scraping page");

        self.enter(PageState::Fetching);
        let body = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(e) => return self.fail(url, page, e),
        };

        self.enter(PageState::Parsing);
        let extract = {
            let document = match parse_document(&body, &url) {
                Ok(document) => document,
                Err(e) => return self.fail(url, page, e),
            };
            self.enter(PageState::Extracting);
            let ctx = ExtractContext {
                source: self.source,
                page_url: &url,
                ids: self.ids,
            };
            extract_document(self.strategy, &document, &ctx)
        };

        if extract.listings.is_empty() {
            debug!(preview = %truncate_for_log(&body, 300), "Page yielded no listings");
        }
        if extract.skipped > 0 || extract.dropped > 0 {
            debug!(
                skipped = extract.skipped,
                dropped = extract.dropped,
                "Some listing nodes were not kept"
            );
        }

        let mut delivered = 0;
        for listing in extract.listings {
            if let Err(listing) = self.sink.deliver(listing).await {
                warn!(id = %listing.id, "Collector closed; listing not delivered");
                break;
            }
            delivered += 1;
        }

        self.enter(PageState::Done);
        info!(source = %self.source.id, page, %url, count = delivered, "Page done");
        PageOutcome {
            url,
            state: PageState::Done,
            failed_at: None,
            error: None,
            delivered,
            next_page: extract.next_page,
        }
    }
}

/// Per-source tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub delivered: usize,
}

impl SourceReport {
    fn record(&mut self, outcome: &PageOutcome) {
        match outcome.state {
            PageState::Done => {
                self.pages_ok += 1;
                self.delivered += outcome.delivered;
            }
            _ => self.pages_failed += 1,
        }
    }
}

/// Visit the pages of one source in order, one at a time.
///
/// Configured pages come first; "next" links discovered on the way are
/// followed only while the source's page budget lasts and never twice.
#[instrument(level = "info", skip_all, fields(source = %source.id))]
pub async fn run_source<F: Fetch>(
    source: Arc<SourceConfig>,
    strategy: Arc<dyn SourceStrategy>,
    fetcher: F,
    ids: Arc<IdGenerator>,
    sink: ListingSink,
    cancel: CancellationToken,
) -> SourceReport {
    let mut report = SourceReport {
        source: source.id.clone(),
        ..SourceReport::default()
    };
    let mut queue: VecDeque<Url> = match source.page_urls() {
        Ok(urls) => urls.into(),
        Err(e) => {
            error!(error = %e, "Cannot build page URLs; skipping source");
            return report;
        }
    };
    info!(strategy = strategy.name(), pages = source.pages, "Starting source");

    let mut visited: HashSet<Url> = HashSet::new();
    while let Some(url) = queue.pop_front() {
        if visited.len() >= source.pages {
            break;
        }
        if !visited.insert(url.clone()) {
            continue;
        }
        if cancel.is_cancelled() {
            warn!(remaining = queue.len() + 1, "Run cancelled; stopping source");
            break;
        }

        let worker = PageWorker::new(&fetcher, strategy.as_ref(), &source, &ids, &sink);
        let outcome = worker.run(url, visited.len()).await;
        report.record(&outcome);

        if let Some(next) = outcome.next_page {
            if !visited.contains(&next) && !queue.contains(&next) {
                debug!(%next, "Discovered next page");
                queue.push_back(next);
            }
        }
    }

    info!(
        pages_ok = report.pages_ok,
        pages_failed = report.pages_failed,
        count = report.delivered,
        "Source finished"
    );
    report
}
