use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `fmc-api` crate.
///
/// Only [`RateLimited`](Error::RateLimited) is handled inside the crate (by
/// the retrier); every other variant reaches the caller unchanged.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token acquisition failed (bad credentials, unreachable token
    /// endpoint, or a token response missing its headers).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The configured domain name is not in the controller's domain list.
    #[error("Domain '{domain}' not found on the controller")]
    DomainNotFound { domain: String },

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-2xx response other than 429.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP 429. `retry_after_secs` is the parsed `Retry-After` header.
    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The server kept answering 429 until the retry budget ran out.
    #[error("Rate limit retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A request body could not be converted to JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A paginated GET followed more `next` links than allowed.
    #[error("Pagination exceeded {limit} pages")]
    PageLimitExceeded { limit: usize },
}

impl Error {
    /// Returns `true` for HTTP 429 responses.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// How long to back off before retrying, or `None` if this error is
    /// not a rate-limit signal. `default` applies when the server sent no
    /// usable `Retry-After` value.
    pub fn rate_limit_delay(&self, default: Duration) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(retry_after_secs.map_or(default, Duration::from_secs))
            }
            _ => None,
        }
    }

    /// Returns `true` if token acquisition failed or the domain is unknown.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::DomainNotFound { .. }
        )
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Http { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } | Self::RetriesExhausted { .. } => Some(429),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
