//! HTTP API for staff devices
//!
//! Routes:
//! - `GET  /health` - liveness
//! - `GET  /metrics` - Prometheus text
//! - `POST /api/login` - `{"email","password"}` -> `{"access_token"}`
//! - `POST /api/logout` - drop the bearer session
//! - `GET  /api/guest/{code}` - guest record
//! - `POST /api/guest/{code}/drink` - register one drink
//!
//! Guest routes require `Authorization: Bearer <token>`. Path codes follow
//! the scanner rules (trim + uppercase, no repair).

use crate::domain::{parse_code, DrinksError, GuestRecord, InputSource};
use crate::infra::metrics::Metrics;
use crate::io::drink_log::DrinkLogSender;
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::session::{SessionGate, SessionToken};
use crate::services::store::GuestStore;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";
const PROMETHEUS: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Largest request body accepted (login is the only route with a body)
pub const MAX_BODY_BYTES: usize = 4 * 1024;

/// Guest as sent over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestPayload {
    pub code: String,
    pub name: Option<String>,
    pub display_name: String,
    pub allowance: u32,
    pub consumed: u32,
    pub remaining: u32,
    pub can_consume_more: bool,
}

impl From<&GuestRecord> for GuestPayload {
    fn from(record: &GuestRecord) -> Self {
        Self {
            code: record.code.to_string(),
            name: record.name.clone(),
            display_name: record.display_name(),
            allowance: record.allowance,
            consumed: record.consumed,
            remaining: record.remaining(),
            can_consume_more: record.can_consume_more(),
        }
    }
}

/// Error body: `{"ok":false,"error":<kind>,"message":<text>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub ok: bool,
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowance: Option<u32>,
}

impl From<&DrinksError> for ErrorPayload {
    fn from(err: &DrinksError) -> Self {
        let (code, allowance) = match err {
            DrinksError::GuestNotFound { code } => (Some(code.clone()), None),
            DrinksError::LimitReached { code, allowance } => (Some(code.clone()), Some(*allowance)),
            DrinksError::MalformedCode { input } => (Some(input.clone()), None),
            _ => (None, None),
        };
        Self { ok: false, error: err.kind().to_string(), message: err.to_string(), code, allowance }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// HTTP status for each error kind
pub fn status_for(err: &DrinksError) -> StatusCode {
    match err {
        DrinksError::EmptyInput | DrinksError::MalformedCode { .. } => StatusCode::BAD_REQUEST,
        DrinksError::InvalidCredentials | DrinksError::Unauthorized => StatusCode::UNAUTHORIZED,
        DrinksError::GuestNotFound { .. } => StatusCode::NOT_FOUND,
        DrinksError::LimitReached { .. } => StatusCode::CONFLICT,
        DrinksError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Everything a request handler needs
pub struct ApiState<S> {
    store: S,
    sessions: Arc<SessionGate>,
    metrics: Arc<Metrics>,
    drink_log: Option<DrinkLogSender>,
    site_id: String,
}

impl<S: GuestStore> ApiState<S> {
    pub fn new(store: S, sessions: Arc<SessionGate>, metrics: Arc<Metrics>, site_id: &str) -> Self {
        Self { store, sessions, metrics, drink_log: None, site_id: site_id.to_string() }
    }

    pub fn with_drink_log(mut self, drink_log: DrinkLogSender) -> Self {
        self.drink_log = Some(drink_log);
        self
    }
}

/// Transport-independent response
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl ApiResponse {
    fn text(status: StatusCode, body: &str) -> Self {
        Self { status, content_type: TEXT, body: body.to_string() }
    }

    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, content_type: JSON, body },
            Err(e) => {
                error!(error = %e, "api_encode_failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    content_type: JSON,
                    body: r#"{"ok":false,"error":"internal","message":"encode failed"}"#
                        .to_string(),
                }
            }
        }
    }

    fn error(err: &DrinksError) -> Self {
        Self::json(status_for(err), &ErrorPayload::from(err))
    }

    fn bad_request(message: &str) -> Self {
        let payload = ErrorPayload {
            ok: false,
            error: "bad_request".to_string(),
            message: message.to_string(),
            code: None,
            allowance: None,
        };
        Self::json(StatusCode::BAD_REQUEST, &payload)
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> Option<SessionToken> {
    let value = header?.trim();
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(SessionToken::from_raw(token))
    }
}

/// Route a request to its handler
pub async fn dispatch<S: GuestStore>(
    state: &ApiState<S>,
    method: &Method,
    path: &str,
    bearer: Option<SessionToken>,
    body: &[u8],
) -> ApiResponse {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["health"]) => ApiResponse::text(StatusCode::OK, "ok"),
        (&Method::GET, ["metrics"]) => ApiResponse {
            status: StatusCode::OK,
            content_type: PROMETHEUS,
            body: format_prometheus_metrics(&state.metrics, &state.site_id),
        },
        (&Method::OPTIONS, _) => ApiResponse::text(StatusCode::NO_CONTENT, ""),
        (&Method::POST, ["api", "login"]) => login(state, body),
        (&Method::POST, ["api", "logout"]) => logout(state, bearer.as_ref()),
        (&Method::GET, ["api", "guest", raw]) => {
            if let Err(e) = state.sessions.authorize(bearer.as_ref()) {
                return ApiResponse::error(&e);
            }
            lookup_guest(state, raw).await
        }
        (&Method::POST, ["api", "guest", raw, "drink"]) => {
            if let Err(e) = state.sessions.authorize(bearer.as_ref()) {
                return ApiResponse::error(&e);
            }
            register_drink(state, raw).await
        }
        _ => ApiResponse::text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn login<S>(state: &ApiState<S>, body: &[u8]) -> ApiResponse {
    let request: LoginRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "login_bad_body");
            return ApiResponse::bad_request("expected {\"email\", \"password\"}");
        }
    };

    match state.sessions.open(&request.email, &request.password) {
        Ok(token) => ApiResponse::json(
            StatusCode::OK,
            &LoginResponse { access_token: token.as_str().to_string() },
        ),
        Err(e) => ApiResponse::error(&e),
    }
}

fn logout<S>(state: &ApiState<S>, bearer: Option<&SessionToken>) -> ApiResponse {
    if let Err(e) = state.sessions.authorize(bearer) {
        return ApiResponse::error(&e);
    }
    if let Some(token) = bearer {
        state.sessions.close(token);
    }
    ApiResponse::json(StatusCode::OK, &serde_json::json!({ "ok": true }))
}

async fn lookup_guest<S: GuestStore>(state: &ApiState<S>, raw: &str) -> ApiResponse {
    let code = match parse_code(raw, InputSource::Scanned) {
        Ok(code) => code,
        Err(e) => {
            state.metrics.record_invalid_code();
            return ApiResponse::error(&e);
        }
    };

    match state.store.lookup(&code).await {
        Ok(record) => ApiResponse::json(StatusCode::OK, &GuestPayload::from(&record)),
        Err(e) => ApiResponse::error(&e),
    }
}

async fn register_drink<S: GuestStore>(state: &ApiState<S>, raw: &str) -> ApiResponse {
    let code = match parse_code(raw, InputSource::Scanned) {
        Ok(code) => code,
        Err(e) => {
            state.metrics.record_invalid_code();
            return ApiResponse::error(&e);
        }
    };

    match state.store.register_drink(&code).await {
        Ok(record) => {
            if let Some(drink_log) = &state.drink_log {
                drink_log.send(&record);
            }
            ApiResponse::json(StatusCode::OK, &GuestPayload::from(&record))
        }
        Err(e) => ApiResponse::error(&e),
    }
}

fn into_hyper(api: ApiResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(api.body)));
    *response.status_mut() = api.status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(api.content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    response
}

/// Read a request body up to `MAX_BODY_BYTES`
async fn read_body<B>(body: B) -> Result<Bytes, ApiResponse>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(limit = %MAX_BODY_BYTES, "api_body_too_large");
            Err(ApiResponse::bad_request("request body too large"))
        }
        Err(e) => {
            debug!(error = %e, "api_body_read_failed");
            Err(ApiResponse::bad_request("unreadable body"))
        }
    }
}

/// Handle HTTP requests
async fn handle_request<S: GuestStore>(
    req: Request<hyper::body::Incoming>,
    state: Arc<ApiState<S>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let (parts, body) = req.into_parts();

    let bearer =
        bearer_token(parts.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()));

    let api = match read_body(body).await {
        Ok(body) => dispatch(&state, &parts.method, parts.uri.path(), bearer, &body).await,
        Err(rejected) => rejected,
    };

    let latency_us = start.elapsed().as_micros() as u64;
    state.metrics.record_request(latency_us);
    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        status = %api.status.as_u16(),
        latency_us = %latency_us,
        "api_request"
    );

    Ok(into_hyper(api))
}

/// Serve the API on an already bound listener until shutdown
pub async fn serve<S: GuestStore + 'static>(
    listener: TcpListener,
    state: Arc<ApiState<S>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind `addr` and start the API server
pub async fn start_api_server<S: GuestStore + 'static>(
    addr: &str,
    state: Arc<ApiState<S>>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("Failed to bind API on {}", addr))?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, site = %state.site_id, "api_server_started");
    serve(listener, state, shutdown).await;
    Ok(())
}
