//! Error taxonomy for a scrape run.
//!
//! Page-level failures ([`ScrapeError::Transport`], [`ScrapeError::Status`],
//! [`ScrapeError::Parse`], [`ScrapeError::Cancelled`]) are contained by the page
//! worker and only ever surface as log lines. Run-level failures
//! ([`ScrapeError::Config`], [`ScrapeError::Serialize`], [`ScrapeError::Io`],
//! [`ScrapeError::Task`]) abort the process with a non-zero exit status.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: StatusCode },

    /// The body could not be treated as an HTML document.
    #[error("could not parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("fetch of {url} cancelled")]
    Cancelled { url: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A spawned task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    /// Whether this error only invalidates a single unit of work.
    pub fn is_page_local(&self) -> bool {
        matches!(
            self,
            ScrapeError::Transport { .. }
                | ScrapeError::Status { .. }
                | ScrapeError::Parse { .. }
                | ScrapeError::Cancelled { .. }
        )
    }
}

impl From<serde_yaml::Error> for ScrapeError {
    fn from(e: serde_yaml::Error) -> Self {
        ScrapeError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = ScrapeError::Status {
            url: "https://example.com/page/2".to_string(),
            status: StatusCode::NOT_FOUND,
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 Not Found fetching https://example.com/page/2"
        );
        assert!(err.is_page_local());
    }

    #[test]
    fn test_run_level_errors_are_not_page_local() {
        assert!(!ScrapeError::Config("bad".into()).is_page_local());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(!ScrapeError::from(io).is_page_local());
    }

    #[test]
    fn test_yaml_error_maps_to_config() {
        let parsed: std::result::Result<Vec<u32>, _> = serde_yaml::from_str("[1, two");
        let err = ScrapeError::from(parsed.unwrap_err());
        assert!(matches!(err, ScrapeError::Config(_)));
    }
}
