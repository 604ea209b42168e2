// FMC session client
//
// Wraps `reqwest::Client` with token-header injection, rate-limit retries,
// and pagination flattening. Token acquisition and refresh live in
// `auth.rs` as inherent methods to keep this module focused on the
// request/response mechanics.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::FutureExt;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::Credentials;
use crate::error::Error;
use crate::pagination;
use crate::retry::{RateLimitRetrier, RetryPolicy};
use crate::session::SessionState;
use crate::transport::{TlsMode, TransportConfig};

/// Header carrying the access token on every authenticated request.
pub const ACCESS_TOKEN_HEADER: &str = "X-auth-access-token";
/// Header carrying the refresh token.
pub const REFRESH_TOKEN_HEADER: &str = "X-auth-refresh-token";
/// Token-endpoint response header with the JSON domain list.
pub const DOMAINS_HEADER: &str = "DOMAINS";

/// Tunables for a [`SessionClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// Custom CA bundle, used only when certificate verification is on.
    pub ca_cert: Option<PathBuf>,
    pub retry: RetryPolicy,
    /// Lifetime assumed for a freshly issued access token.
    pub session_ttl: Duration,
    /// Refreshes allowed before a full re-authentication is forced.
    pub max_refreshes: u32,
    /// Ceiling on pages followed by one `get`. `None` trusts the server.
    pub max_pages: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            ca_cert: None,
            retry: RetryPolicy::default(),
            session_ttl: Duration::from_secs(1800),
            max_refreshes: 3,
            max_pages: None,
        }
    }
}

impl ClientOptions {
    /// Transport settings for the given credentials' verification flag.
    pub fn transport_config(&self, credentials: &Credentials) -> TransportConfig {
        let tls = match (&self.ca_cert, credentials.verify_cert) {
            (Some(path), true) => TlsMode::CustomCa(path.clone()),
            (_, verify) => TlsMode::from_verify_flag(verify),
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }
}

/// Session-managing HTTP client for the FMC REST API.
///
/// Every verb makes sure the session is usable before sending, attaches
/// the access token, retries on HTTP 429, and decodes the JSON response.
/// All session-mutating methods take `&mut self`: one client serves one
/// logical caller at a time. Share it across tasks only behind an
/// external lock (e.g. `tokio::sync::Mutex`).
pub struct SessionClient {
    http: reqwest::Client,
    base_url: Url,
    pub(crate) credentials: Credentials,
    pub(crate) options: ClientOptions,
    pub(crate) session: SessionState,
}

impl SessionClient {
    /// Build a client from credentials and authenticate immediately.
    ///
    /// The base URL is `https://{host}:{port}/api/`.
    pub async fn from_credentials(
        credentials: Credentials,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let base_url = credentials.base_url()?;
        let http = options.transport_config(&credentials).build_client()?;
        let mut client = Self::with_client(http, base_url, credentials, options);
        client.authenticate().await?;
        Ok(client)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// No request is made; the first verb call (or an explicit
    /// [`authenticate`](Self::authenticate)) opens the session.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Credentials,
        options: ClientOptions,
    ) -> Self {
        Self {
            http,
            base_url,
            credentials,
            options,
            session: SessionState::default(),
        }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The API root every relative path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Current session bookkeeping (expiry, refresh count, domain).
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Identifier of the configured domain, known after authentication.
    pub fn domain_uuid(&self) -> Option<&str> {
        self.session.domain_uuid()
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative API path (e.g. `"fmc_config/v1/domain"`) onto the
    /// base URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn retrier(&self) -> RateLimitRetrier {
        RateLimitRetrier::new(self.options.retry)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    /// GET `url`, following `paging.next` links until exhausted.
    ///
    /// The `items` of every page are concatenated onto the first page and
    /// the `paging` descriptor is removed before decoding into `T`.
    pub async fn get<T: DeserializeOwned>(&mut self, url: &Url) -> Result<T, Error> {
        let value = self.get_all_pages(url).await?;
        decode(value)
    }

    /// POST a JSON body to `url`.
    pub async fn post<T: DeserializeOwned>(
        &mut self,
        url: &Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        let body = encode(body)?;
        let value = self.send(Method::POST, url, Some(body)).await?;
        decode(value)
    }

    /// PUT a JSON body to `url`.
    pub async fn put<T: DeserializeOwned>(
        &mut self,
        url: &Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        let body = encode(body)?;
        let value = self.send(Method::PUT, url, Some(body)).await?;
        decode(value)
    }

    /// DELETE `url`.
    pub async fn delete<T: DeserializeOwned>(&mut self, url: &Url) -> Result<T, Error> {
        let value = self.send(Method::DELETE, url, None).await?;
        decode(value)
    }

    async fn get_all_pages(&mut self, url: &Url) -> Result<Value, Error> {
        let mut acc = self.send(Method::GET, url, None).await?;
        let mut next = pagination::next_link(&acc, url)?;
        let mut pages: usize = 1;

        while let Some(link) = next {
            if let Some(limit) = self.options.max_pages {
                if pages >= limit {
                    return Err(Error::PageLimitExceeded { limit });
                }
            }
            pages += 1;
            debug!(page = pages, "following pagination link {link}");

            let page = self.send(Method::GET, &link, None).await?;
            next = pagination::next_link(&page, &link)?;
            pagination::append_items(&mut acc, page);
        }

        pagination::strip_paging(&mut acc);
        Ok(acc)
    }

    /// One request under rate-limit protection.
    async fn send(&mut self, method: Method, url: &Url, body: Option<Value>) -> Result<Value, Error> {
        let retrier = self.retrier();
        retrier
            .run(self, |client| {
                client
                    .send_once(method.clone(), url.clone(), body.clone())
                    .boxed()
            })
            .await
    }

    async fn send_once(
        &mut self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Value, Error> {
        self.refresh_if_needed().await?;

        let token = self
            .session
            .access_token()
            .ok_or_else(|| Error::Authentication {
                message: "no active session".into(),
            })?;

        debug!("{method} {url}");

        let mut builder = self
            .http
            .request(method, url)
            .header(ACCESS_TOKEN_HEADER, token);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        parse_json(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

/// Map non-2xx statuses onto errors, passing successful responses through.
///
/// 429 becomes [`Error::RateLimited`] carrying the `Retry-After` seconds
/// when the header holds a whole number.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(Error::RateLimited { retry_after_secs });
    }

    let body = resp.text().await.unwrap_or_default();
    Err(Error::Http {
        status: status.as_u16(),
        body,
    })
}

async fn parse_json(resp: reqwest::Response) -> Result<Value, Error> {
    let resp = check_status(resp).await?;
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}

fn encode(body: &impl Serialize) -> Result<Value, Error> {
    serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    T::deserialize(&value).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}
