//! API middleware
//!
//! Contains:
//! - Application state shared by all handlers
//! - `ApiError`, the JSON error body every endpoint returns
//! - Authentication (session token resolution, sliding cookie refresh)
//! - Per-IP throttling and the whole-request timeout

use axum::{
    extract::{ConnectInfo, FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ExpiryPolicy, SessionConfig};
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository, SqlxReactionRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Session, User};
use crate::services::{
    AuthService, ForumService, RateLimiter, ReactionLedger, RequestGate, ServiceError,
    SessionManager,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub sessions: Arc<SessionManager>,
    pub auth: Arc<AuthService>,
    pub gate: Arc<RequestGate>,
    pub ledger: Arc<ReactionLedger>,
    pub forum: Arc<ForumService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub session_config: Arc<SessionConfig>,
    pub request_timeout: Duration,
}

impl AppState {
    /// Wire the SQLite repositories and services from configuration
    pub fn new(pool: DynDatabasePool, config: &Config) -> Self {
        let query_timeout = config.database.query_timeout();
        let users = SqlxUserRepository::boxed(pool.clone());

        let sessions = Arc::new(SessionManager::new(
            SqlxSessionRepository::boxed(pool.clone()),
            &config.session,
            query_timeout,
        ));
        let auth = Arc::new(AuthService::new(
            users.clone(),
            sessions.clone(),
            config.registration.uniqueness,
            query_timeout,
        ));
        let gate = Arc::new(RequestGate::new(sessions.clone(), users, query_timeout));
        let ledger = Arc::new(ReactionLedger::new(
            SqlxReactionRepository::boxed(pool.clone()),
            query_timeout,
        ));
        let forum = Arc::new(ForumService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCommentRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            query_timeout,
        ));

        Self {
            pool,
            sessions,
            auth,
            gate,
            ledger,
            forum,
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            session_config: Arc::new(config.session.clone()),
            request_timeout: config.server.request_timeout(),
        }
    }
}

/// Signed-in user and their session, placed in request extensions by
/// `require_auth` / `optional_auth`
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session: Session,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ServiceError::AuthenticationRequired.into())
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "AUTH_REQUIRED" | "INVALID_CREDENTIALS" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "INVALID_TARGET" | "INVALID_VALUE" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "TRANSIENT" | "TIMEOUT" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidCredentials => Self::new("INVALID_CREDENTIALS", message),
            ServiceError::AuthenticationRequired => Self::new("AUTH_REQUIRED", message),
            ServiceError::InvalidTarget(_) => Self::new("INVALID_TARGET", message),
            ServiceError::InvalidValue(_) => Self::new("INVALID_VALUE", message),
            ServiceError::DuplicateIdentity(field) => {
                Self::with_details("CONFLICT", message, serde_json::json!({ "field": field }))
            }
            ServiceError::Validation(msg) => Self::validation_error(msg),
            ServiceError::NotFound(_) => Self::new("NOT_FOUND", message),
            ServiceError::Transient(detail) => {
                tracing::warn!("Transient store failure: {}", detail);
                Self::with_details(
                    "TRANSIENT",
                    "Service temporarily unavailable, please retry",
                    serde_json::json!({ "retryable": true }),
                )
            }
            ServiceError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                Self::internal_error("Internal server error")
            }
        }
    }
}

// ============================================================================
// Session transport
// ============================================================================

/// Session token from `Authorization: Bearer`, else from the session cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_str) = cookie_header.to_str() else {
            continue;
        };
        for cookie in cookie_str.split(';') {
            if let Some((name, value)) = cookie.trim().split_once('=') {
                if name == cookie_name && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value carrying a session; expiry mirrors `expires_at`
pub fn session_cookie(cookie_name: &str, session: &Session) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}; Expires={}",
        cookie_name,
        session.id,
        session.remaining_seconds(),
        session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_cookie(cookie_name: &str) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        cookie_name
    )
}

/// Header map with a single `Set-Cookie`
pub fn set_cookie_headers(cookie: &str) -> Result<HeaderMap, ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::internal_error("Invalid session cookie"))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

async fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthenticatedUser>, ApiError> {
    let token = extract_session_token(headers, &state.session_config.cookie_name);
    let identity = state.gate.current_user(token.as_deref()).await?;
    Ok(identity.map(|(user, session)| AuthenticatedUser { user, session }))
}

/// With sliding expiry, hand the client a cookie with the refreshed expiry
fn refresh_cookie(state: &AppState, session: &Session, response: &mut Response) {
    if state.session_config.expiry_policy != ExpiryPolicy::Sliding
        || response.headers().contains_key(header::SET_COOKIE)
    {
        return;
    }
    let cookie = session_cookie(&state.session_config.cookie_name, session);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
}

/// Authentication middleware: rejects requests without a live session
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state, request.headers())
        .await?
        .ok_or(ServiceError::AuthenticationRequired)?;

    let session = identity.session.clone();
    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;
    refresh_cookie(&state, &session, &mut response);
    Ok(response)
}

/// Optional authentication middleware: attaches the identity when present
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state, request.headers()).await?;

    let session = identity.as_ref().map(|i| i.session.clone());
    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }
    let mut response = next.run(request).await;
    if let Some(session) = session {
        refresh_cookie(&state, &session, &mut response);
    }
    Ok(response)
}

// ============================================================================
// Throttling
// ============================================================================

/// Client IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then the peer
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
    {
        return Some(ip);
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
    {
        return Some(ip);
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
}

/// Per-IP fixed window limit
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(ip) = client_ip(&request) {
        if !state.rate_limiter.check_request(ip).await {
            tracing::warn!("Rate limit exceeded for {}", ip);
            return Err(ApiError::rate_limited("Too many requests, slow down", 60));
        }
    }
    Ok(next.run(request).await)
}

/// Whole-request deadline
pub async fn request_timeout(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match tokio::time::timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            tracing::warn!(
                "Request exceeded {} s deadline",
                state.request_timeout.as_secs()
            );
            Err(ApiError::new("TIMEOUT", "Request timed out"))
        }
    }
}
