//! Remote fetch layer: one HTTP retrieval with bounded retries.
//!
//! Every transport failure is classified into a [`FailureKind`] and recovered
//! locally. Callers only ever see [`FetchOutcome::Success`],
//! [`FetchOutcome::Empty`], or a propagated timeout.

mod encode;
mod fetcher;
mod transport;

pub use encode::encode_url_components;
pub use fetcher::{Fetcher, RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{
    HttpTransport, ReqwestTransport, TransportError, install_rustls_provider,
    validate_request_target,
};

use bytes::Bytes;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry unchanged after the standard delay.
    Transient,
    /// Upstream overload; retry after the extended delay.
    RateLimited,
    /// Illegal characters in the URL; retry once with the URL re-encoded.
    Malformed,
    /// The only kind that propagates once attempts are exhausted.
    TimedOut,
}

/// Result of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Bytes),
    /// Nothing usable came back: an empty body, or retries were exhausted.
    Empty,
    /// A single unretried attempt failed, see [`Fetcher::fetch_once`].
    Failure(FailureKind),
}

impl FetchOutcome {
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Self::Success(bytes) => Some(bytes),
            Self::Empty | Self::Failure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
