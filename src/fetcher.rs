//! HTTP fetching with a per-source politeness gate.
//!
//! # Architecture
//!
//! - [`Fetch`]: Core trait, one GET per call, body returned as text
//! - [`HttpFetcher`]: `reqwest`-backed implementation shared by every source
//! - [`Throttled`]: Decorator that makes callers wait on a [`MinIntervalGate`]
//!   before delegating, so each source gets its own request spacing
//!
//! Every wait and every request races the run's [`CancellationToken`]; a
//! cancelled run turns in-flight fetches into [`ScrapeError::Cancelled`].

use crate::error::{Result, ScrapeError};
use rand::{Rng, rng};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

/// Fetch one page and return its body.
///
/// Non-2xx statuses and transport failures are errors tagged with the URL;
/// they are never fatal to the run.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String>> + Send;
}

impl<F: Fetch> Fetch for Arc<F> {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String>> + Send {
        (**self).fetch(url)
    }
}

/// `reqwest`-backed [`Fetch`] implementation.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    cancel: CancellationToken,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, cancel })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String> {
        let transport = |source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        };
        let request = async {
            let resp = self.client.get(url.clone()).send().await.map_err(transport)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ScrapeError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            resp.text().await.map_err(transport)
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScrapeError::Cancelled { url: url.to_string() }),
            res = request => {
                if let Ok(body) = &res {
                    debug!(bytes = body.len(), "Fetched page");
                }
                res
            }
        }
    }
}

/// Minimum-interval gate: consecutive passes are at least `interval` apart.
///
/// The lock is held while waiting, so concurrent callers queue up instead of
/// all waking at the same deadline.
#[derive(Debug)]
pub struct MinIntervalGate {
    interval: Duration,
    jitter: Duration,
    last: Mutex<Option<Instant>>,
    cancel: CancellationToken,
}

impl MinIntervalGate {
    pub fn new(interval: Duration, jitter: Duration, cancel: CancellationToken) -> Self {
        Self {
            interval,
            jitter,
            last: Mutex::new(None),
            cancel,
        }
    }

    fn jitter_now(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng().random_range(0..=max_ms))
    }

    /// Wait until the next request may start; `url` only tags the cancellation error.
    pub async fn wait(&self, url: &Url) -> Result<()> {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let deadline = prev + self.interval + self.jitter_now();
            if deadline > Instant::now() {
                debug!(%url, wait_ms = (deadline - Instant::now()).as_millis() as u64, "Rate limit wait");
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(ScrapeError::Cancelled { url: url.to_string() });
                }
                _ = sleep_until(deadline) => {}
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

/// Decorator that passes every request through a [`MinIntervalGate`].
#[derive(Debug)]
pub struct Throttled<F> {
    inner: F,
    gate: MinIntervalGate,
}

impl<F: Fetch> Throttled<F> {
    pub fn new(inner: F, gate: MinIntervalGate) -> Self {
        Self { inner, gate }
    }
}

impl<F: Fetch> Fetch for Throttled<F> {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.gate.wait(url).await?;
        self.inner.fetch(url).await
    }
}
