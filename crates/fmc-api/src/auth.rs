// Token authentication
//
// Basic-auth token generation, refresh-token exchange, and domain
// resolution. Every flow runs under the rate-limit retrier; anything other
// than HTTP 429 surfaces on the first failure.

use futures_util::FutureExt;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::client::{
    ACCESS_TOKEN_HEADER, DOMAINS_HEADER, REFRESH_TOKEN_HEADER, SessionClient, check_status,
};
use crate::error::Error;
use crate::session::{SessionAction, TokenPair};

const GENERATE_TOKEN_PATH: &str = "fmc_platform/v1/auth/generatetoken";
const REFRESH_TOKEN_PATH: &str = "fmc_platform/v1/auth/refreshtoken";

/// Domain every FMC has; used when no domain is configured.
pub const DEFAULT_DOMAIN: &str = "Global";

/// Login material and controller address. Immutable once a client owns it.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Name of the administrative domain to operate in.
    pub domain_name: String,
    /// Verify the controller's TLS certificate.
    pub verify_cert: bool,
}

impl Credentials {
    /// Credentials for the `Global` domain with certificate checks off.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: SecretString::from(password.into()),
            domain_name: DEFAULT_DOMAIN.into(),
            verify_cert: false,
        }
    }

    pub fn with_domain(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = domain_name.into();
        self
    }

    pub fn with_verify_cert(mut self, verify_cert: bool) -> Self {
        self.verify_cert = verify_cert;
        self
    }

    /// `https://{host}:{port}/api/`
    pub fn base_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!(
            "https://{}:{}/api/",
            self.host, self.port
        ))?)
    }
}

/// One entry of the `DOMAINS` header.
#[derive(Debug, Clone, Deserialize)]
pub struct Domain {
    pub name: String,
    pub uuid: String,
}

/// Find the identifier of `name` in a raw `DOMAINS` header value.
pub fn resolve_domain(raw: &str, name: &str) -> Result<String, Error> {
    let domains: Vec<Domain> = serde_json::from_str(raw).map_err(|e| Error::Authentication {
        message: format!("malformed {DOMAINS_HEADER} header: {e}"),
    })?;

    domains
        .into_iter()
        .find(|d| d.name == name)
        .map(|d| d.uuid)
        .ok_or_else(|| Error::DomainNotFound {
            domain: name.to_owned(),
        })
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Result<&'h str, Error> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Authentication {
            message: format!("token response missing {name} header"),
        })
}

fn token_pair(headers: &HeaderMap) -> Result<TokenPair, Error> {
    Ok(TokenPair {
        access: SecretString::from(header(headers, ACCESS_TOKEN_HEADER)?.to_owned()),
        refresh: SecretString::from(header(headers, REFRESH_TOKEN_HEADER)?.to_owned()),
    })
}

impl SessionClient {
    /// Open a new session with the configured credentials.
    ///
    /// `POST /api/fmc_platform/v1/auth/generatetoken` with basic auth.
    /// Replaces any existing session and resets the refresh counter.
    pub async fn authenticate(&mut self) -> Result<(), Error> {
        let retrier = self.retrier();
        retrier
            .run(self, |client| client.authenticate_once().boxed())
            .await
    }

    /// Make the session usable for the next request.
    ///
    /// No-op while the access token is unexpired. An expired token is
    /// refreshed, unless the refresh budget is spent (or there never was a
    /// session), in which case a full [`authenticate`](Self::authenticate)
    /// runs instead.
    pub async fn refresh_if_needed(&mut self) -> Result<(), Error> {
        match self
            .session
            .next_action(Instant::now(), self.options.max_refreshes)
        {
            SessionAction::Reuse => Ok(()),
            SessionAction::Authenticate => {
                debug!(
                    refreshes = self.session.refresh_count(),
                    "session unusable, re-authenticating"
                );
                self.authenticate().await
            }
            SessionAction::Refresh => {
                let retrier = self.retrier();
                retrier
                    .run(self, |client| client.refresh_once().boxed())
                    .await
            }
        }
    }

    async fn authenticate_once(&mut self) -> Result<(), Error> {
        let url = self.url(GENERATE_TOKEN_PATH)?;
        info!(user = %self.credentials.username, "requesting access token at {url}");

        let resp = self
            .http()
            .post(url)
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .body("")
            .send()
            .await
            .map_err(|e| Error::Authentication {
                message: format!("token request failed: {e}"),
            })?;

        let resp = check_status(resp).await?;
        let headers = resp.headers();

        let domains = header(headers, DOMAINS_HEADER)?;
        let domain_uuid = resolve_domain(domains, &self.credentials.domain_name)?;
        let tokens = token_pair(headers)?;

        self.session
            .establish(tokens, domain_uuid, self.options.session_ttl);

        info!(
            domain = %self.credentials.domain_name,
            "authenticated"
        );
        Ok(())
    }

    async fn refresh_once(&mut self) -> Result<(), Error> {
        let url = self.url(REFRESH_TOKEN_PATH)?;
        let (Some(access), Some(refresh)) =
            (self.session.access_token(), self.session.refresh_token())
        else {
            return Err(Error::Authentication {
                message: "no refresh token available".into(),
            });
        };

        debug!("refreshing access token at {url}");

        let resp = self
            .http()
            .post(url)
            .header(ACCESS_TOKEN_HEADER, access)
            .header(REFRESH_TOKEN_HEADER, refresh)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let tokens = token_pair(resp.headers())?;
        self.session.refreshed(tokens, self.options.session_ttl);

        info!(
            refreshes = self.session.refresh_count(),
            "access token refreshed"
        );
        Ok(())
    }
}
