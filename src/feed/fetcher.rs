use crate::config::Config;
use crate::feed::parser::{parse_rss, DecodeError, RawFeed};
use crate::ingest::CancellationToken;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Client identifier sent as the `User-Agent` header unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a feed.
///
/// Everything except [`FetchError::Decode`] describes the transport and may
/// well succeed on the next attempt. A decode failure means the server handed
/// back bytes that are not an RSS document we understand.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// The caller's cancellation token fired while the request was in flight
    #[error("Request cancelled")]
    Cancelled,
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Response body is not valid UTF-8
    #[error("Response body is not valid UTF-8: {0}")]
    Body(#[from] std::str::Utf8Error),
    /// Body arrived intact but is not a usable RSS document
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    /// Whether retrying the same URL later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Decode(_))
    }
}

/// Fetches one feed document per call. No retries: the scheduler comes back
/// to the feed on a later tick.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl FeedFetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_feed_bytes,
        )
    }

    /// GET `url` and decode the body as RSS.
    ///
    /// Bounded by the fetcher's timeout and aborted as soon as `cancel` fires,
    /// whichever comes first.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Cancelled`] - `cancel` fired before the body was decoded
    /// - [`FetchError::Timeout`] - the request plus body read exceeded the timeout
    /// - [`FetchError::Network`] / [`FetchError::HttpStatus`] - transport failures
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] - body problems
    /// - [`FetchError::Body`] - the body is not UTF-8
    /// - [`FetchError::Decode`] - the body is not an RSS document
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<RawFeed, FetchError> {
        let bytes = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(FetchError::Cancelled),

            result = tokio::time::timeout(self.timeout, self.fetch_bytes(url)) => {
                result.map_err(|_| FetchError::Timeout)??
            }
        };

        let content = std::str::from_utf8(&bytes)?;
        let feed = parse_rss(content)?;

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = feed.items.len(),
            "Fetched feed document"
        );
        Ok(feed)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><title>One</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024 * 1024).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("user-agent", "gator"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(feed.title, "Test");
        assert_eq!(feed.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_server_error_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(503)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_feed_is_decode_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        match &err {
            FetchError::Decode(_) => {}
            e => panic!("Expected Decode error, got {:?}", e),
        }
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_non_utf8_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00, 0x3c]))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Body(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_response_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let small = FeedFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024).unwrap();
        let err = small
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let quick = FeedFetcher::new(DEFAULT_USER_AGENT, Duration::from_millis(100), 1024).unwrap();
        let err = quick
            .fetch(&format!("{}/feed", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Port 9 (discard) is never contacted: cancellation wins the select.
        let err = fetcher()
            .fetch("http://127.0.0.1:9/feed", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
