use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use scraper::Html;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (compatible; satbank/0.1)";

/// A page-level fetch failure. Recoverable: the caller skips the page and
/// moves on, it never aborts a bulk run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },
}

/// Source of parsed pages. The live implementation is `Fetcher`; the link
/// walk is written against this seam so it can be driven from canned
/// documents without a network.
pub trait PageSource {
    fn page(&self, url: &str) -> Result<Html, FetchError>;
}

/// Blocking HTTP fetcher with a fixed inter-request delay. The delay is a
/// cooperative throttle on the source server, applied before every request,
/// including the first.
pub struct Fetcher {
    client: Client,
    delay: Duration,
}

impl Fetcher {
    pub fn new(delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;

        Ok(Self { client, delay })
    }

    /// Fetch one page and parse it into a document tree. Never returns
    /// partial content: any transport error, timeout, or non-2xx status is a
    /// `FetchError`.
    pub fn fetch(&self, url: &str) -> Result<Html, FetchError> {
        thread::sleep(self.delay);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        Ok(Html::parse_document(&body))
    }
}

impl PageSource for Fetcher {
    fn page(&self, url: &str) -> Result<Html, FetchError> {
        self.fetch(url)
    }
}
