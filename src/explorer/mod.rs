//! Block Explorer Client Module
//!
//! Shared HTTP plumbing for the Etherscan and Tronscan clients: request
//! timeouts, bounded concurrency, a minimum spacing between requests and
//! retries with exponential backoff on transient failures.

pub mod etherscan;
pub mod tronscan;

pub use etherscan::{EtherscanClient, EthTransaction};
pub use tronscan::{TronTransactionInfo, TronscanClient, Trc20TransferInfo};

use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::config::{ChainConfig, RetryConfig};

// ============================================================================
// ERRORS
// ============================================================================

/// Failure talking to a block explorer.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error {status} from {url}")]
    Server { url: String, status: u16 },
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("explorer API error: {0}")]
    Api(String),
    #[error("{last} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ExplorerError>,
    },
}

impl ExplorerError {
    /// Whether another attempt may succeed: timeouts, connection errors, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExplorerError::Transport { .. } | ExplorerError::RateLimited(_) | ExplorerError::Server { .. }
        )
    }
}

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Exponential backoff with a cap and random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus up to 25% random jitter, still capped at `max_delay`.
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let jitter_ms = (base.as_millis() as u64) / 4;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (base + jitter).min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

// ============================================================================
// EXPLORER HTTP CLIENT
// ============================================================================

/// Rate-limited, retrying HTTP GET client for one explorer.
///
/// Clones share the same limiter state.
#[derive(Clone)]
pub struct ExplorerHttp {
    /// HTTP client with the per-request timeout applied
    client: Client,
    /// Explorer API base URL without trailing slash
    base_url: String,
    retry: RetryPolicy,
    /// Bounds in-flight requests
    permits: Arc<Semaphore>,
    /// Minimum spacing between request starts
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl ExplorerHttp {
    /// Creates a client from a chain's explorer settings.
    ///
    /// # Arguments
    ///
    /// * `config` - Chain configuration with URL, timeout, limits and retry policy
    ///
    /// # Returns
    ///
    /// * `Ok(ExplorerHttp)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to build the HTTP client
    pub fn new(config: &ChainConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.explorer_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(&config.retry),
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a GET and interprets the JSON body, retrying transient failures.
    ///
    /// `interpret` runs inside the retry loop so explorer-level rate limit
    /// answers (HTTP 200 with an error body) are retried like HTTP 429.
    ///
    /// # Arguments
    ///
    /// * `path` - Path below the base URL, empty for the base URL itself
    /// * `query` - Query parameters
    /// * `headers` - Extra request headers (API keys)
    /// * `interpret` - Converts the JSON body into the caller's result
    pub async fn get_json<T, F>(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: &[(&'static str, String)],
        interpret: F,
    ) -> Result<T, ExplorerError>
    where
        F: Fn(serde_json::Value) -> Result<T, ExplorerError>,
    {
        let url = self.url(path);
        let mut attempt = 0u32;
        loop {
            let outcome = match self.get_once(&url, query, headers).await {
                Ok(body) => interpret(body),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.backoff_with_jitter(attempt);
                    warn!(
                        "Explorer request to {} failed ({}/{}): {}. Retrying in {:?}",
                        url,
                        attempt + 1,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ExplorerError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&'static str, String)],
    ) -> Result<serde_json::Value, ExplorerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExplorerError::Api("request limiter closed".to_string()))?;
        self.throttle().await;

        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        debug!("GET {}", url);
        let response = request.send().await.map_err(|source| ExplorerError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ExplorerError::RateLimited(format!("HTTP 429 from {}", url)));
        }
        if status.is_server_error() {
            return Err(ExplorerError::Server {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ExplorerError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<serde_json::Value>().await.map_err(|source| {
            if source.is_decode() {
                ExplorerError::Malformed(format!("{} returned invalid JSON: {}", url, source))
            } else {
                ExplorerError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        })
    }

    /// Waits until `min_interval` has passed since the previous request started.
    async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }
}

/// Parses an Ethereum quantity, hex with `0x` prefix or plain decimal.
pub fn parse_quantity(value: &str) -> Option<u64> {
    match value.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
        None => value.parse().ok(),
    }
}
