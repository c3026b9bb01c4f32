use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use tracing::{info, warn};

use super::encode::encode_url_components;
use super::transport::{HttpTransport, ReqwestTransport, TransportError};
use super::{FailureKind, FetchOutcome};
use crate::config::FetchConfig;
use crate::error::{CatalogError, Result};

/// Retry budget and pauses.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause after every failed attempt that will be retried.
    pub retry_delay: Duration,
    /// Additional pause after a rate-limited attempt.
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            rate_limit_delay: config.rate_limit_delay(),
        }
    }
}

/// Sleep hook, so the retry pauses can be observed without a real clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Single HTTP retrieval with bounded retries and failure classification.
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Fetcher over a real `reqwest` client configured from `config`.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(TokioSleeper),
            RetryPolicy::from(config),
        ))
    }

    /// Fetch `url`, retrying per the failure classification.
    ///
    /// Returns [`FetchOutcome::Empty`] once attempts are exhausted, except for
    /// timeouts, which are returned as [`CatalogError::Timeout`].
    pub async fn fetch(&self, url: &str, headers: Option<&HeaderMap>) -> Result<FetchOutcome> {
        let body = self.fetch_decoded(url, headers, Ok).await?;
        Ok(body.map_or(FetchOutcome::Empty, FetchOutcome::Success))
    }

    /// Like [`Fetcher::fetch`], but the body must be valid UTF-8. A decode
    /// failure is retried like any other transient failure.
    pub async fn fetch_text(&self, url: &str, headers: Option<&HeaderMap>) -> Result<Option<String>> {
        self.fetch_decoded(url, headers, |body| {
            String::from_utf8(body.to_vec()).map_err(|e| TransportError::Decode(e.to_string()))
        })
        .await
    }

    /// One attempt, no retries and no pauses. Failures, timeouts included,
    /// are reported as [`FetchOutcome::Failure`].
    pub async fn fetch_once(&self, url: &str, headers: Option<&HeaderMap>) -> FetchOutcome {
        let headers = headers.cloned().unwrap_or_default();
        match self.transport.get(url, &headers).await {
            Ok(body) if body.is_empty() => FetchOutcome::Empty,
            Ok(body) => FetchOutcome::Success(body),
            Err(e) => FetchOutcome::Failure(e.kind()),
        }
    }

    async fn fetch_decoded<T, F>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        decode: F,
    ) -> Result<Option<T>>
    where
        F: Fn(Bytes) -> std::result::Result<T, TransportError> + Send + Sync,
        T: Send,
    {
        let headers = headers.cloned().unwrap_or_default();
        let mut target = url.to_owned();
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=self.policy.max_attempts {
            let error = match self.transport.get(&target, &headers).await {
                Ok(body) if body.is_empty() => return Ok(None),
                Ok(body) => match decode(body) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            let kind = error.kind();
            info!(
                url = %target,
                attempt,
                kind = ?kind,
                error = %error,
                "Fetch attempt failed"
            );
            last_error = Some(error);

            if attempt == self.policy.max_attempts {
                if kind == FailureKind::TimedOut {
                    warn!(url = %target, "Request timed out on every attempt");
                    return Err(CatalogError::timeout(target));
                }
                break;
            }

            match kind {
                FailureKind::Malformed => {
                    target = encode_url_components(&target);
                    info!(url = %target, "Invalid url, encoding and trying again");
                }
                FailureKind::RateLimited => {
                    self.sleeper.sleep(self.policy.rate_limit_delay).await;
                }
                FailureKind::Transient | FailureKind::TimedOut => {}
            }
            self.sleeper.sleep(self.policy.retry_delay).await;
        }

        warn!(
            url = %target,
            error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
            "Multiple HTTP errors, unable to get url data, skipping"
        );
        Ok(None)
    }
}
