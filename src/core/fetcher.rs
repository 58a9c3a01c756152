//! Page fetching with a bounded number of attempts.
//!
//! Every failure (transport error, timeout, non-2xx status) is retried until
//! the attempt budget runs out; the last failure is then reported to the
//! caller. Response bodies are decoded to text before normalization.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Source of raw page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Return the decoded response body for `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl From<&FetchConfig> for FetchOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            timeout: config.timeout(),
            attempts: config.attempts.max(1),
            retry_delay: config.retry_delay(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(&options.user_agent)
            .gzip(true)
            .build()?;

        Ok(Self { client, options })
    }

    async fn fetch_once(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let charset = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(decode_body(&body, charset.as_deref()))
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.options.timeout)
        } else {
            FetchError::Http(err)
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        let attempts = self.options.attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.fetch_once(&parsed).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt < attempts => {
                    debug!(
                        "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, attempts, url, err, self.options.retry_delay
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(FetchError::Exhausted {
                        attempts,
                        last: Box::new(err),
                    })
                }
            }
        }
    }
}

/// Pull the `charset` parameter out of a Content-Type header value.
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decode a response body: valid UTF-8 wins, then the declared charset, then
/// a confident guess from the bytes, then lossy UTF-8.
pub fn decode_body(bytes: &[u8], declared_charset: Option<&str>) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.trim_start_matches('\u{feff}').to_string();
    }

    let encoding = declared_charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| {
            let mut detector = chardetng::EncodingDetector::new();
            detector.feed(bytes, true);
            let (guess, confident) = detector.guess_assess(None, true);
            confident.then_some(guess)
        })
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}
