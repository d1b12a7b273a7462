use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{Client, Response, Url};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{LoadError, LoadResult};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts (0 disables retries)
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// Largest response body accepted, in bytes
    pub max_response_bytes: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 0,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            max_response_bytes: 16 * 1024 * 1024,
            user_agent: format!("xml-validator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Async HTTP client for fetching documents and schemas
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    /// Create a new async HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> LoadResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LoadError::Http {
                url: String::new(),
                details: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    /// Fetch a URL as UTF-8 text, enforcing the size limit while streaming
    pub async fn fetch_text(&self, url: &Url) -> LoadResult<String> {
        let response = self.get_response_with_retry(url).await?;
        let limit = self.config.max_response_bytes;

        if let Some(length) = response.content_length()
            && length > limit
        {
            return Err(LoadError::TooLarge {
                url: url.to_string(),
                limit_bytes: limit,
            });
        }

        let mut buffer = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = TryStreamExt::try_next(&mut stream)
            .await
            .map_err(|e| self.http_error(url, &e))?
        {
            if buffer.len() as u64 + chunk.len() as u64 > limit {
                return Err(LoadError::TooLarge {
                    url: url.to_string(),
                    limit_bytes: limit,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        String::from_utf8(buffer).map_err(|_| LoadError::Decode {
            url: url.to_string(),
        })
    }

    /// Get response, retrying transient failures with exponential backoff
    async fn get_response_with_retry(&self, url: &Url) -> LoadResult<Response> {
        let mut current_attempt = 0;

        loop {
            let error = match self.make_request(url).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    LoadError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                        message: format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        ),
                    }
                }
                Err(error) => error,
            };

            if current_attempt < self.config.retry_attempts && error.is_transient() {
                warn!(url = %url, attempt = current_attempt + 1, error = %error, "Retrying fetch");
                self.wait_before_retry(current_attempt).await;
                current_attempt += 1;
                continue;
            }

            return Err(error);
        }
    }

    /// Make a single HTTP request with timeout
    async fn make_request(&self, url: &Url) -> LoadResult<Response> {
        debug!(url = %url, "GET");
        let request_future = self.client.get(url.clone()).send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| LoadError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(|e| self.http_error(url, &e))
    }

    /// Wait before retry with exponential backoff
    async fn wait_before_retry(&self, attempt: u32) {
        sleep(self.retry_delay(attempt)).await;
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn http_error(&self, url: &Url, error: &reqwest::Error) -> LoadError {
        if error.is_timeout() {
            return LoadError::Timeout {
                url: url.to_string(),
                timeout_seconds: self.config.timeout_seconds,
            };
        }
        LoadError::Http {
            url: url.to_string(),
            details: error.to_string(),
        }
    }
}
