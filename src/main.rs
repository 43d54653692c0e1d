//! # Listing Harvest
//!
//! A concurrent real-estate listing scraper. Every configured source is
//! scraped by its own task, page by page, and each listing card is normalized
//! into one common [`models::Listing`] shape before being written to a single
//! JSON artifact.
//!
//! ## Features
//!
//! - Built-in strategies for realestateinnepal.com and realestate.com.au (Dubai)
//! - YAML source configuration with per-source page budget and request spacing
//! - Unit-aware normalization of prices, room counts and floor area
//! - Per-page failure isolation: a dead page never aborts the run
//! - Atomic artifact write; Ctrl-C stops fetching and keeps what was collected
//!
//! ## Usage
//!
//! ```sh
//! listing_harvest -d ./data -o properties.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Configuration**: CLI flags and an optional YAML file select the sources
//! 2. **Scraping**: one task per source fetches its pages sequentially
//! 3. **Collection**: listings flow through a channel to a single collector
//! 4. **Output**: the collected sequence is written once as JSON

use clap::Parser;
use itertools::Itertools;
use std::error::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collector;
mod config;
mod coordinator;
mod error;
mod fetcher;
mod models;
mod normalize;
mod outputs;
mod sources;
mod utils;
mod worker;

use cli::Cli;
use config::HarvestConfig;
use coordinator::Coordinator;
use fetcher::HttpFetcher;
use outputs::json;
use sources::StrategyRegistry;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("listing_harvest starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.data_dir, ?args.sources, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = HarvestConfig::load(args.config.as_deref()).await?;
    config.retain_sources(&args.sources)?;
    if let Some(millis) = args.min_interval_ms {
        config.override_min_interval(millis);
    }
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    // Early check: fail before any network traffic if the artifact cannot be written
    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Cancellation ----
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping fetches and keeping collected listings");
                cancel.cancel();
            }
        });
    }

    // ---- Scrape ----
    let fetcher = HttpFetcher::new(&config.user_agent, config.request_timeout(), cancel.clone())?;
    let coordinator = Coordinator::new(fetcher, StrategyRegistry::new(), cancel);
    let report = coordinator.run(&config).await?;

    for (source, count) in report.counts_by_source().into_iter().sorted() {
        info!(%source, count, "Listings per source");
    }

    // ---- Output ----
    let output_path = args.output_path();
    if let Err(e) = json::write_listings(&report.listings, &output_path).await {
        error!(path = %output_path.display(), error = %e, "Failed to write JSON artifact");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        count = report.listings.len(),
        path = %output_path.display(),
        pages_ok = report.pages_ok(),
        pages_failed = report.pages_failed(),
        duplicates = report.duplicates,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Scraping complete"
    );

    Ok(())
}
