//! Single owner of the run's result sequence.
//!
//! Producers hold a cloneable [`ListingSink`] and move listings into it. One
//! drain task owns the `Vec<Listing>` outright, so there is exactly one writer
//! no matter how many sources run. The drain finishes once every sink clone has
//! been dropped, which is how the coordinator knows the sequence is complete.
//!
//! The order of the returned listings is delivery order and carries no meaning.

use crate::models::Listing;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Producer half of the aggregation channel.
#[derive(Debug, Clone)]
pub struct ListingSink {
    tx: mpsc::Sender<Listing>,
}

impl ListingSink {
    /// Hand a listing over to the collector.
    ///
    /// Returns the listing back if the collector is gone.
    pub async fn deliver(&self, listing: Listing) -> Result<(), Box<Listing>> {
        self.tx.send(listing).await.map_err(|e| Box::new(e.0))
    }
}

/// Everything the collector accumulated.
#[derive(Debug, Default)]
pub struct Collected {
    pub listings: Vec<Listing>,
    /// Listings discarded because their id was already collected.
    pub duplicates: usize,
}

/// Consumer half of the aggregation channel.
#[derive(Debug)]
pub struct Collector {
    rx: mpsc::Receiver<Listing>,
}

impl Collector {
    /// Create a connected sink/collector pair with a bounded buffer.
    pub fn channel(capacity: usize) -> (ListingSink, Collector) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ListingSink { tx }, Collector { rx })
    }

    /// Run the drain loop on its own task.
    pub fn spawn(self) -> JoinHandle<Collected> {
        tokio::spawn(self.drain())
    }

    /// Receive until every sink is dropped.
    ///
    /// A listing whose id was already collected is discarded, keeping ids
    /// unique across the artifact.
    pub async fn drain(mut self) -> Collected {
        let mut collected = Collected::default();
        let mut seen = HashSet::new();
        while let Some(listing) = self.rx.recv().await {
            if seen.insert(listing.id.clone()) {
                debug!(id = %listing.id, source = %listing.source, "Collected listing");
                collected.listings.push(listing);
            } else {
                warn!(id = %listing.id, source = %listing.source, url = %listing.url, "Duplicate listing id; keeping the first");
                collected.duplicates += 1;
            }
        }
        info!(
            count = collected.listings.len(),
            duplicates = collected.duplicates,
            "Collector drained"
        );
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn listing(id: &str, source: &str) -> Listing {
        Listing {
            id: id.to_string(),
            title: format!("Listing {id}"),
            price: 100.0,
            currency: "NPR".to_string(),
            location: String::new(),
            description: format!("Listing {id}"),
            bedrooms: 0,
            bathrooms: 0,
            area_sq_ft: 0.0,
            url: format!("https://example.com/{id}"),
            scraped_at: Utc::now(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn test_collects_from_many_producers() {
        let (sink, collector) = Collector::channel(4);
        let handle = collector.spawn();

        let producers: Vec<_> = (0..8)
            .map(|p| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        sink.deliver(listing(&format!("{p}-{i}"), "s")).await.unwrap();
                    }
                })
            })
            .collect();
        drop(sink);
        for p in producers {
            p.await.unwrap();
        }

        let collected = handle.await.unwrap();
        assert_eq!(collected.listings.len(), 400);
        assert_eq!(collected.duplicates, 0);
        let ids: HashSet<_> = collected.listings.iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids.len(), 400);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_dropped() {
        let (sink, collector) = Collector::channel(8);
        let handle = collector.spawn();
        sink.deliver(listing("a", "one")).await.unwrap();
        sink.deliver(listing("a", "two")).await.unwrap();
        sink.deliver(listing("b", "two")).await.unwrap();
        drop(sink);

        let collected = handle.await.unwrap();
        assert_eq!(collected.duplicates, 1);
        assert_eq!(collected.listings.len(), 2);
        assert_eq!(collected.listings[0].source, "one");
    }

    #[tokio::test]
    async fn test_no_producers_yields_empty() {
        let (sink, collector) = Collector::channel(1);
        drop(sink);
        let collected = collector.drain().await;
        assert!(collected.listings.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_after_collector_dropped() {
        let (sink, collector) = Collector::channel(1);
        drop(collector);
        let back = sink.deliver(listing("x", "s")).await.unwrap_err();
        assert_eq!(back.id, "x");
    }
}
