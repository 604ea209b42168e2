// fmc-api: Async session client for the Firepower Management Center REST API

pub mod auth;
pub mod client;
pub mod error;
mod pagination;
pub mod retry;
pub mod session;
pub mod transport;

pub use auth::{Credentials, DEFAULT_DOMAIN, Domain};
pub use client::{ClientOptions, SessionClient};
pub use error::Error;
pub use retry::{RateLimitRetrier, RetryPolicy};
pub use session::{SessionAction, SessionState};
pub use transport::{TlsMode, TransportConfig};
