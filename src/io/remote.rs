//! HTTP client for a running gateway
//!
//! Implements the same `Authenticator` and `GuestStore` contracts as the
//! in-process gate and ledger, so the desk console can run against either.

use crate::domain::{parse_code, DrinksError, GuestCode, GuestRecord, InputSource, Result};
use crate::io::api::{ErrorPayload, GuestPayload, LoginRequest, LoginResponse};
use crate::services::session::{Authenticator, SessionToken};
use crate::services::store::GuestStore;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RemoteBackend {
    base_url: String,
    client: reqwest::Client,
    token: RwLock<Option<SessionToken>>,
}

impl RemoteBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_bearer(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_ref() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token.as_str())),
            None => request,
        }
    }

    /// Send and decode either the success body or the error payload
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "remote_request_failed");
            DrinksError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| DrinksError::Unavailable(e.to_string()))?;
        debug!(status = %status.as_u16(), bytes = %body.len(), "remote_response");

        decode_response(status, &body)
    }

    async fn fetch_guest(&self, request: RequestBuilder) -> Result<GuestRecord> {
        let payload: GuestPayload = self.call(self.with_bearer(request)).await?;
        record_from_payload(payload)
    }
}

/// Map a response to a value or the error it carries
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T> {
    if status.is_success() {
        return serde_json::from_slice(body)
            .map_err(|e| DrinksError::Unavailable(format!("bad response body: {e}")));
    }

    match serde_json::from_slice::<ErrorPayload>(body) {
        Ok(payload) => Err(error_from_payload(payload)),
        Err(_) => Err(DrinksError::Unavailable(format!("HTTP {}", status.as_u16()))),
    }
}

/// Rebuild a typed error from its wire form
pub fn error_from_payload(payload: ErrorPayload) -> DrinksError {
    let code = payload.code.unwrap_or_default();
    match payload.error.as_str() {
        "empty_input" => DrinksError::EmptyInput,
        "malformed_code" => DrinksError::MalformedCode { input: code },
        "guest_not_found" => DrinksError::GuestNotFound { code },
        "limit_reached" => {
            DrinksError::LimitReached { code, allowance: payload.allowance.unwrap_or_default() }
        }
        "invalid_credentials" => DrinksError::InvalidCredentials,
        "unauthorized" => DrinksError::Unauthorized,
        _ => DrinksError::Unavailable(payload.message),
    }
}

fn record_from_payload(payload: GuestPayload) -> Result<GuestRecord> {
    let code = parse_code(&payload.code, InputSource::Scanned)
        .map_err(|_| DrinksError::Unavailable(format!("server sent bad code {}", payload.code)))?;
    Ok(GuestRecord::new(code, payload.name.as_deref(), payload.allowance)
        .with_consumed(payload.consumed))
}

#[async_trait]
impl Authenticator for RemoteBackend {
    async fn login(&self, email: &str, password: &str) -> Result<SessionToken> {
        let body = serde_json::to_vec(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .map_err(|e| DrinksError::Unavailable(e.to_string()))?;

        let request =
            self.client.post(self.url("/api/login")).header(CONTENT_TYPE, "application/json").body(body);
        let response: LoginResponse = self.call(request).await?;

        let token = SessionToken::from_raw(&response.access_token);
        *self.token.write() = Some(token.clone());
        Ok(token)
    }

    async fn logout(&self, token: &SessionToken) {
        let request = self
            .client
            .post(self.url("/api/logout"))
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()));

        if let Err(e) = self.call::<serde_json::Value>(request).await {
            debug!(error = %e, "remote_logout_failed");
        }

        let mut current = self.token.write();
        if current.as_ref() == Some(token) {
            *current = None;
        }
    }
}

#[async_trait]
impl GuestStore for RemoteBackend {
    async fn lookup(&self, code: &GuestCode) -> Result<GuestRecord> {
        let request = self.client.get(self.url(&format!("/api/guest/{}", code)));
        self.fetch_guest(request).await
    }

    async fn register_drink(&self, code: &GuestCode) -> Result<GuestRecord> {
        let request = self.client.post(self.url(&format!("/api/guest/{}/drink", code)));
        self.fetch_guest(request).await
    }
}
