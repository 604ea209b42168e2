// Session token state and the refresh-vs-reauthenticate decision.
//
// The state is owned by exactly one `SessionClient` and only mutated
// through `&mut` access, so there is no locking here. Callers sharing a
// client across tasks must serialise access themselves.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

/// Access/refresh token pair as returned by the token endpoints.
#[derive(Debug, Clone)]
pub(crate) struct TokenPair {
    pub access: SecretString,
    pub refresh: SecretString,
}

/// What `refresh_if_needed` has to do before the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Token still valid.
    Reuse,
    /// Exchange the refresh token for a new pair.
    Refresh,
    /// Run a full credential login.
    Authenticate,
}

/// Live session of one client.
#[derive(Debug, Default)]
pub struct SessionState {
    tokens: Option<TokenPair>,
    expires_at: Option<Instant>,
    refresh_count: u32,
    domain_uuid: Option<String>,
}

impl SessionState {
    /// `true` while no token exists or `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expiry| now >= expiry)
    }

    /// Decide how to make the session usable at `now`.
    ///
    /// After `max_refreshes` successful refreshes the refresh chain is
    /// abandoned and a full authentication is forced.
    pub fn next_action(&self, now: Instant, max_refreshes: u32) -> SessionAction {
        if !self.is_expired_at(now) {
            SessionAction::Reuse
        } else if self.tokens.is_none() || self.refresh_count >= max_refreshes {
            SessionAction::Authenticate
        } else {
            SessionAction::Refresh
        }
    }

    /// Refreshes performed since the last full authentication.
    pub fn refresh_count(&self) -> u32 {
        self.refresh_count
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn domain_uuid(&self) -> Option<&str> {
        self.domain_uuid.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub(crate) fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access.expose_secret())
    }

    pub(crate) fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh.expose_secret())
    }

    /// Replace the whole session after a full authentication.
    pub(crate) fn establish(&mut self, tokens: TokenPair, domain_uuid: String, ttl: Duration) {
        *self = Self {
            tokens: Some(tokens),
            expires_at: Some(Instant::now() + ttl),
            refresh_count: 0,
            domain_uuid: Some(domain_uuid),
        };
    }

    /// Swap in a refreshed token pair, keeping the resolved domain.
    pub(crate) fn refreshed(&mut self, tokens: TokenPair, ttl: Duration) {
        self.tokens = Some(tokens);
        self.expires_at = Some(Instant::now() + ttl);
        self.refresh_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(tag: &str) -> TokenPair {
        TokenPair {
            access: format!("access-{tag}").into(),
            refresh: format!("refresh-{tag}").into(),
        }
    }

    const TTL: Duration = Duration::from_secs(1800);

    #[test]
    fn empty_session_requires_authentication() {
        let state = SessionState::default();
        assert!(state.is_expired_at(Instant::now()));
        assert_eq!(
            state.next_action(Instant::now(), 3),
            SessionAction::Authenticate
        );
    }

    #[test]
    fn valid_token_is_reused_until_expiry() {
        let mut state = SessionState::default();
        state.establish(pair("a"), "u1".into(), TTL);
        let expiry = state.expires_at().unwrap_or_else(Instant::now);

        assert_eq!(
            state.next_action(expiry - Duration::from_secs(1), 3),
            SessionAction::Reuse
        );
        assert_eq!(state.next_action(expiry, 3), SessionAction::Refresh);
        assert_eq!(
            state.next_action(expiry + Duration::from_secs(1), 3),
            SessionAction::Refresh
        );
    }

    #[test]
    fn third_refresh_forces_authentication_next() {
        let mut state = SessionState::default();
        state.establish(pair("a"), "u1".into(), TTL);

        for round in 1..=3 {
            let now = state.expires_at().unwrap_or_else(Instant::now);
            assert_eq!(state.next_action(now, 3), SessionAction::Refresh);
            state.refreshed(pair("r"), TTL);
            assert_eq!(state.refresh_count(), round);
        }

        let now = state.expires_at().unwrap_or_else(Instant::now);
        assert_eq!(state.next_action(now, 3), SessionAction::Authenticate);

        state.establish(pair("b"), "u1".into(), TTL);
        assert_eq!(state.refresh_count(), 0);
        assert_eq!(state.access_token(), Some("access-b"));
    }

    #[test]
    fn refresh_keeps_domain() {
        let mut state = SessionState::default();
        state.establish(pair("a"), "u1".into(), TTL);
        state.refreshed(pair("b"), TTL);
        assert_eq!(state.domain_uuid(), Some("u1"));
        assert_eq!(state.refresh_token(), Some("refresh-b"));
    }
}
