//! Staff session gate
//!
//! A single configured credential pair is accepted. Successful logins hand
//! out opaque UUIDv7 tokens that stay valid until logged out, or until
//! `max_sessions` newer sessions push them out.

use crate::domain::{DrinksError, Result};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Opaque session token
///
/// Generated tokens order by creation time (UUIDv7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a new time-sortable token
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap a token received from elsewhere (e.g. a bearer header)
    pub fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Login contract. Implemented in-process by [`SessionGate`] and over HTTP
/// by the remote client.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<SessionToken>;

    async fn logout(&self, token: &SessionToken);
}

#[derive(Debug, Clone)]
struct Credentials {
    email: String,
    password: String,
}

/// Open sessions kept before the oldest is evicted
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Issues and checks session tokens for the one staff credential
pub struct SessionGate {
    credentials: Credentials,
    active: RwLock<BTreeSet<SessionToken>>,
    max_sessions: usize,
    metrics: Option<Arc<Metrics>>,
}

impl SessionGate {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            credentials: Credentials { email: email.to_string(), password: password.to_string() },
            active: RwLock::new(BTreeSet::new()),
            max_sessions: DEFAULT_MAX_SESSIONS,
            metrics: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.auth_email(), config.auth_password())
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    fn publish_session_count(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_active_sessions(count as u64);
        }
    }

    /// Check the credential pair and open a session
    pub fn open(&self, email: &str, password: &str) -> Result<SessionToken> {
        let ok = email.trim().eq_ignore_ascii_case(&self.credentials.email)
            && password == self.credentials.password;

        if let Some(metrics) = &self.metrics {
            metrics.record_login(ok);
        }

        if !ok {
            warn!(email = %email, "login_failed");
            return Err(DrinksError::InvalidCredentials);
        }

        let token = SessionToken::generate();
        let (count, evicted) = {
            let mut active = self.active.write();
            active.insert(token.clone());
            let mut evicted = 0usize;
            while active.len() > self.max_sessions {
                active.pop_first();
                evicted += 1;
            }
            (active.len(), evicted)
        };
        self.publish_session_count(count);
        if evicted > 0 {
            info!(evicted = %evicted, max_sessions = %self.max_sessions, "session_evicted");
        }
        info!(email = %email, sessions = %count, "login_ok");

        Ok(token)
    }

    /// Drop a session. Unknown tokens are ignored.
    pub fn close(&self, token: &SessionToken) {
        let (removed, count) = {
            let mut active = self.active.write();
            let removed = active.remove(token);
            (removed, active.len())
        };
        if removed {
            self.publish_session_count(count);
            info!(sessions = %count, "logout");
        }
    }

    pub fn is_authenticated(&self, token: &SessionToken) -> bool {
        self.active.read().contains(token)
    }

    /// Require a live session, as the API does for every guest call
    pub fn authorize(&self, token: Option<&SessionToken>) -> Result<()> {
        match token {
            Some(token) if self.is_authenticated(token) => Ok(()),
            _ => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_unauthorized();
                }
                Err(DrinksError::Unauthorized)
            }
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active.read().len()
    }
}

#[async_trait]
impl Authenticator for SessionGate {
    async fn login(&self, email: &str, password: &str) -> Result<SessionToken> {
        self.open(email, password)
    }

    async fn logout(&self, token: &SessionToken) {
        self.close(token);
    }
}

/// Client-side holder of the current staff session
#[derive(Debug, Default)]
pub struct Session {
    token: Option<SessionToken>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in through any authenticator and keep the token
    pub async fn login<A: Authenticator + ?Sized>(
        &mut self,
        auth: &A,
        email: &str,
        password: &str,
    ) -> Result<()> {
        let token = auth.login(email, password).await?;
        self.token = Some(token);
        Ok(())
    }

    /// Log out through the authenticator and forget the token
    pub async fn logout<A: Authenticator + ?Sized>(&mut self, auth: &A) {
        if let Some(token) = self.token.take() {
            auth.logout(&token).await;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SessionGate {
        SessionGate::new("atendente@teste.com", "123456")
    }

    #[test]
    fn test_login_with_valid_credentials() {
        let gate = gate();
        let token = gate.open("atendente@teste.com", "123456").unwrap();
        assert!(gate.is_authenticated(&token));
        assert_eq!(token.as_str().len(), 36);
        assert_eq!(gate.active_sessions(), 1);
    }

    #[test]
    fn test_email_is_case_insensitive() {
        let gate = gate();
        assert!(gate.open("  Atendente@Teste.com ", "123456").is_ok());
    }

    #[test]
    fn test_login_rejects_wrong_credentials() {
        let gate = gate();
        assert_eq!(gate.open("atendente@teste.com", "654321"), Err(DrinksError::InvalidCredentials));
        assert_eq!(gate.open("other@teste.com", "123456"), Err(DrinksError::InvalidCredentials));
        assert_eq!(gate.open("", ""), Err(DrinksError::InvalidCredentials));
        assert_eq!(gate.active_sessions(), 0);
    }

    #[test]
    fn test_logout_invalidates_token() {
        let gate = gate();
        let token = gate.open("atendente@teste.com", "123456").unwrap();
        gate.close(&token);
        assert!(!gate.is_authenticated(&token));
        assert_eq!(gate.authorize(Some(&token)), Err(DrinksError::Unauthorized));

        // Second logout is a no-op
        gate.close(&token);
        assert_eq!(gate.active_sessions(), 0);
    }

    #[test]
    fn test_authorize() {
        let metrics = Arc::new(Metrics::new());
        let gate = gate().with_metrics(metrics.clone());
        let token = gate.open("atendente@teste.com", "123456").unwrap();

        assert!(gate.authorize(Some(&token)).is_ok());
        assert_eq!(gate.authorize(None), Err(DrinksError::Unauthorized));
        assert_eq!(
            gate.authorize(Some(&SessionToken::from_raw("mock-jwt-token"))),
            Err(DrinksError::Unauthorized)
        );

        let summary = metrics.snapshot();
        assert_eq!(summary.logins_total, 1);
        assert_eq!(summary.unauthorized_total, 2);
        assert_eq!(summary.active_sessions, 1);
    }

    #[test]
    fn test_oldest_sessions_are_evicted() {
        let gate = gate().with_max_sessions(2);

        let mut tokens = Vec::new();
        for _ in 0..3 {
            tokens.push(gate.open("atendente@teste.com", "123456").unwrap());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        assert_eq!(gate.active_sessions(), 2);
        assert!(!gate.is_authenticated(&tokens[0]));
        assert!(gate.is_authenticated(&tokens[1]));
        assert!(gate.is_authenticated(&tokens[2]));
    }

    #[test]
    fn test_default_cap_bounds_abandoned_logins() {
        let gate = gate();
        for _ in 0..DEFAULT_MAX_SESSIONS + 10 {
            gate.open("atendente@teste.com", "123456").unwrap();
        }
        assert_eq!(gate.active_sessions(), DEFAULT_MAX_SESSIONS);
    }

    #[test]
    fn test_tokens_are_unique() {
        let gate = gate();
        let a = gate.open("atendente@teste.com", "123456").unwrap();
        let b = gate.open("atendente@teste.com", "123456").unwrap();
        assert_ne!(a, b);
        assert_eq!(gate.active_sessions(), 2);
    }

    #[tokio::test]
    async fn test_client_session_lifecycle() {
        let gate = gate();
        let mut session = Session::new();
        assert!(!session.is_authenticated());

        let err = session.login(&gate, "atendente@teste.com", "wrong").await.unwrap_err();
        assert_eq!(err, DrinksError::InvalidCredentials);
        assert!(!session.is_authenticated());

        session.login(&gate, "atendente@teste.com", "123456").await.unwrap();
        assert!(session.is_authenticated());
        let token = session.token().cloned().unwrap();
        assert!(gate.is_authenticated(&token));

        session.logout(&gate).await;
        assert!(!session.is_authenticated());
        assert!(!gate.is_authenticated(&token));
    }
}
