//! nginx stub_status scraping
//!
//! The endpoint produces a fixed four-line grammar:
//!
//! ```text
//! Active connections: 1
//! server accepts handled requests
//!  16 16 18
//! Reading: 0 Writing: 1 Waiting: 0
//! ```
//!
//! The scrape subtracts one from `active` and `writing` to exclude its own
//! in-flight request.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use nubi_model::{Error, Result};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_URL: &str = "http://127.0.0.1:80/.nubi/status";

static COUNTERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\d+)\s*$").unwrap());
static STATES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Reading:\s*(\d+)\s+Writing:\s*(\d+)\s+Waiting:\s*(\d+)").unwrap());

/// Parsed stub_status counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StubStatus {
    pub active_connections: i64,
    pub accepts: i64,
    pub handled: i64,
    pub requests: i64,
    pub reading: i64,
    pub writing: i64,
    pub waiting: i64,
}

/// Parse the four-line stub_status format, tolerating surrounding whitespace.
pub fn parse(body: &str) -> StubStatus {
    let mut status = StubStatus::default();

    for line in body.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Active connections:") {
            status.active_connections = rest.trim().parse().unwrap_or(0);
        } else if let Some(caps) = COUNTERS_RE.captures(line) {
            status.accepts = caps[1].parse().unwrap_or(0);
            status.handled = caps[2].parse().unwrap_or(0);
            status.requests = caps[3].parse().unwrap_or(0);
        } else if let Some(caps) = STATES_RE.captures(line) {
            status.reading = caps[1].parse().unwrap_or(0);
            status.writing = caps[2].parse().unwrap_or(0);
            status.waiting = caps[3].parse().unwrap_or(0);
        }
    }

    status
}

/// HTTP scraper for the stub_status endpoint
#[derive(Debug, Clone)]
pub struct StubStatusClient {
    url: String,
    http: reqwest::Client,
}

impl StubStatusClient {
    pub fn new(url: Option<String>) -> Self {
        let url = match url {
            Some(u) if !u.is_empty() => u,
            _ => DEFAULT_URL.to_string(),
        };

        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    /// Fetch and parse the counters, excluding the scrape's own request.
    pub async fn scrape(&self) -> Result<StubStatus> {
        let body = self
            .http
            .get(&self.url)
            .timeout(SCRAPE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("stub_status fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Transient(format!("stub_status read failed: {e}")))?;

        let mut status = parse(&body);
        if status.active_connections > 0 {
            status.active_connections -= 1;
        }
        if status.writing > 0 {
            status.writing -= 1;
        }

        debug!(active = status.active_connections, "scraped stub_status");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Active connections: 3\nserver accepts handled requests\n 16 16 18\nReading: 1 Writing: 2 Waiting: 0\n";

    #[test]
    fn parses_the_four_line_format() {
        let status = parse(SAMPLE);
        assert_eq!(
            status,
            StubStatus {
                active_connections: 3,
                accepts: 16,
                handled: 16,
                requests: 18,
                reading: 1,
                writing: 2,
                waiting: 0,
            }
        );
    }

    #[test]
    fn tolerates_leading_and_trailing_whitespace() {
        let padded = "  Active connections: 5  \n server accepts handled requests \n   100 99 250   \n  Reading: 0 Writing: 1 Waiting: 4  \n";
        let status = parse(padded);
        assert_eq!(status.active_connections, 5);
        assert_eq!(status.accepts, 100);
        assert_eq!(status.handled, 99);
        assert_eq!(status.requests, 250);
        assert_eq!(status.waiting, 4);
    }

    #[test]
    fn unparseable_input_yields_zeroes() {
        assert_eq!(parse("not stub status at all"), StubStatus::default());
    }

    #[tokio::test]
    async fn scrape_failure_is_transient() {
        // Nothing listens on this port.
        let client = StubStatusClient::new(Some("http://127.0.0.1:1/none".into()));
        let err = client.scrape().await.unwrap_err();
        assert_eq!(err.kind(), "transient");
    }
}
