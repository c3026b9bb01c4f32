use std::sync::OnceLock;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::FailureKind;
use crate::config::FetchConfig;
use crate::error::Result;

/// A single transport failure, before classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("malformed response encoding: {0}")]
    Decode(String),

    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("incomplete body: {0}")]
    Incomplete(String),
}

impl TransportError {
    /// Map the failure onto the retry taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            // The upstream answers 404 when it is overloaded.
            Self::Status { status, .. } if *status == StatusCode::NOT_FOUND => {
                FailureKind::RateLimited
            }
            Self::Timeout => FailureKind::TimedOut,
            Self::InvalidUrl(_) => FailureKind::Malformed,
            Self::Decode(_) | Self::Status { .. } | Self::Connection(_) | Self::Incomplete(_) => {
                FailureKind::Transient
            }
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_builder() {
            Self::InvalidUrl(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_body() {
            Self::Incomplete(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// The HTTP seam used by [`super::Fetcher`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> std::result::Result<Bytes, TransportError>;
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// `reqwest` backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        install_rustls_provider();
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> std::result::Result<Bytes, TransportError> {
        validate_request_target(url)?;

        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status,
                url: url.to_owned(),
            });
        }

        response.bytes().await.map_err(TransportError::from_reqwest)
    }
}

/// Reject request targets an HTTP/1.1 request line cannot carry verbatim.
pub fn validate_request_target(url: &str) -> std::result::Result<(), TransportError> {
    const UNSAFE: &[char] = &['<', '>', '"', '{', '}', '|', '\\', '^', '`'];

    if let Some(c) = url
        .chars()
        .find(|c| c.is_ascii_control() || c.is_whitespace() || !c.is_ascii() || UNSAFE.contains(c))
    {
        return Err(TransportError::InvalidUrl(format!(
            "illegal character {c:?} in {url}"
        )));
    }

    Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_rate_limited() {
        let err = TransportError::Status {
            status: StatusCode::NOT_FOUND,
            url: "https://site.test".to_owned(),
        };
        assert_eq!(err.kind(), FailureKind::RateLimited);

        let err = TransportError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: "https://site.test".to_owned(),
        };
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[test]
    fn classifies_remaining_failures() {
        assert_eq!(TransportError::Timeout.kind(), FailureKind::TimedOut);
        assert_eq!(
            TransportError::InvalidUrl(String::new()).kind(),
            FailureKind::Malformed
        );
        assert_eq!(
            TransportError::Incomplete(String::new()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            TransportError::Connection("reset by peer".to_owned()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            TransportError::Decode(String::new()).kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn request_target_validation() {
        assert!(validate_request_target("https://site.test/a/b.php?x=1&y=2").is_ok());
        assert!(validate_request_target("https://site.test/a%20b").is_ok());
        assert!(matches!(
            validate_request_target("https://site.test/a b"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_request_target("https://site.test/?q=a|b"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_request_target("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
