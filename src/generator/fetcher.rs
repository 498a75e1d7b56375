//! Subscription fetching with retry
//!
//! A subscription URL gets a fixed number of attempts, each with its own
//! timeout and separated by a random delay. Every failure is logged; running
//! out of attempts yields `None` so one dead provider never fails the batch.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::parser::text::decode_bytes;

// ============================================================================
// Fetch Settings
// ============================================================================

/// `[fetch]` section of the generator config
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FetchSettings {
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per URL, including the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_min_ms")]
    pub retry_delay_min_ms: u64,

    #[serde(default = "default_retry_delay_max_ms")]
    pub retry_delay_max_ms: u64,

    /// Upper bound on subscriptions fetched at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Bound on the whole fetch phase; unfinished sources contribute nothing
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_min_ms: default_retry_delay_min_ms(),
            retry_delay_max_ms: default_retry_delay_max_ms(),
            concurrency: default_concurrency(),
            deadline_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

impl FetchSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            bail!("fetch.max_retries must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("fetch.concurrency must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be at least 1");
        }
        if self.retry_delay_min_ms > self.retry_delay_max_ms {
            bail!(
                "fetch.retry_delay_min_ms ({}) exceeds fetch.retry_delay_max_ms ({})",
                self.retry_delay_min_ms,
                self.retry_delay_max_ms
            );
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Uniformly random pause between two attempts
    fn retry_delay(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.retry_delay_min_ms..=self.retry_delay_max_ms);
        Duration::from_millis(ms)
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_min_ms() -> u64 {
    1000
}

fn default_retry_delay_max_ms() -> u64 {
    3000
}

fn default_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

// ============================================================================
// Subscription Fetcher
// ============================================================================

/// Why one attempt failed
#[derive(Debug, Error)]
enum AttemptError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Other(reqwest::Error),
}

/// HTTP client for subscription URLs
#[derive(Clone, Debug)]
pub struct SubscriptionFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl SubscriptionFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        settings.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch a subscription body, retrying on any failure.
    ///
    /// Returns `None` once every attempt has failed.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        let attempts = self.settings.max_retries;

        for attempt in 1..=attempts {
            debug!("Fetching {} (attempt {}/{})", url, attempt, attempts);
            match self.try_fetch(url).await {
                Ok(body) => {
                    info!("Fetched {} bytes from {}", body.len(), url);
                    return Some(body);
                }
                Err(e) => warn!(
                    "Fetching {} failed (attempt {}/{}): {}",
                    url, attempt, attempts, e
                ),
            }

            if attempt < attempts {
                let delay = self.settings.retry_delay();
                debug!("Retrying {} in {:?}", url, delay);
                tokio::time::sleep(delay).await;
            }
        }

        warn!("Giving up on {} after {} attempts", url, attempts);
        None
    }

    async fn try_fetch(&self, url: &str) -> Result<String, AttemptError> {
        let timeout = self.settings.timeout();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AttemptError::Status(status));
        }

        let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
        Ok(decode_bytes(&bytes))
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> AttemptError {
    if error.is_timeout() {
        AttemptError::Timeout(timeout)
    } else if error.is_connect() {
        AttemptError::Connect(error)
    } else {
        AttemptError::Other(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_settings() -> FetchSettings {
        FetchSettings {
            timeout_secs: 1,
            retry_delay_min_ms: 5,
            retry_delay_max_ms: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_fetch_settings_defaults() {
        let settings: FetchSettings = toml::from_str("").unwrap();
        assert_eq!(settings, FetchSettings::default());
        assert_eq!(settings.timeout(), Duration::from_secs(60));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.concurrency, 4);
        assert!(settings.deadline().is_none());
        assert!(settings.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_fetch_settings_validation() {
        let mut settings = FetchSettings::default();
        settings.retry_delay_min_ms = 5000;
        assert!(settings.validate().is_err());

        let settings = FetchSettings {
            max_retries: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = FetchSettings {
            concurrency: 0,
            ..Default::default()
        };
        assert!(SubscriptionFetcher::new(settings).is_err());
    }

    #[test]
    fn test_retry_delay_in_range() {
        let settings = FetchSettings::default();
        for _ in 0..20 {
            let delay = settings.retry_delay();
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .and(header("user-agent", default_user_agent().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("ss://abc"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = SubscriptionFetcher::new(fast_settings()).unwrap();
        let body = fetcher.fetch(&format!("{}/sub", server.uri())).await;
        assert_eq!(body.as_deref(), Some("ss://abc"));
    }

    #[tokio::test]
    async fn test_fetch_retries_on_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = SubscriptionFetcher::new(fast_settings()).unwrap();
        assert!(fetcher.fetch(&server.uri()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_non_200_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let settings = FetchSettings {
            max_retries: 1,
            ..fast_settings()
        };
        let fetcher = SubscriptionFetcher::new(settings).unwrap();
        assert!(fetcher.fetch(&server.uri()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_times_out_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = SubscriptionFetcher::new(fast_settings()).unwrap();
        assert!(fetcher.fetch(&server.uri()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let settings = FetchSettings {
            max_retries: 2,
            ..fast_settings()
        };
        let fetcher = SubscriptionFetcher::new(settings).unwrap();
        assert!(fetcher.fetch("http://127.0.0.1:9/sub").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_decodes_gbk_body() {
        let (gbk, _, _) = encoding_rs::GBK.encode("香港");
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gbk.into_owned()))
            .mount(&server)
            .await;

        let fetcher = SubscriptionFetcher::new(fast_settings()).unwrap();
        assert_eq!(fetcher.fetch(&server.uri()).await.as_deref(), Some("香港"));
    }
}
