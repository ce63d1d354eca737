//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Register and sign in
//! - POST /api/v1/auth/login - Sign in with username or email
//! - POST /api/v1/auth/logout - Sign out (idempotent)
//! - POST /api/v1/auth/guest - Drop any session and continue as guest
//! - GET /api/v1/auth/me - Current user

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    clear_cookie, extract_session_token, session_cookie, set_cookie_headers, ApiError, AppState,
    AuthenticatedUser,
};
use crate::models::{Session, User};
use crate::services::{LoginInput, RegisterInput, ServiceError};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

/// Response for GET /auth/me
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub expires_at: DateTime<Utc>,
}

fn auth_response(
    state: &AppState,
    user: User,
    session: Session,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let headers = set_cookie_headers(&session_cookie(&state.session_config.cookie_name, &session))?;
    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.password != body.confirm_password {
        return Err(ApiError::validation_error("Passwords do not match"));
    }

    let user = state
        .auth
        .register(RegisterInput {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;

    let session = state.sessions.create_session(user.id).await?;
    let (headers, body) = auth_response(&state, user, session)?;
    Ok((StatusCode::CREATED, headers, body))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = body.identifier.trim().to_string();

    if state.rate_limiter.is_login_limited(&identifier).await {
        tracing::warn!("Login throttled for {}", identifier);
        return Err(ApiError::rate_limited(
            "Too many failed logins, try again later",
            900,
        ));
    }

    let result = state
        .auth
        .login(LoginInput {
            identifier: identifier.clone(),
            password: body.password,
        })
        .await;

    match result {
        Ok((user, session)) => {
            state.rate_limiter.clear_login_failures(&identifier).await;
            auth_response(&state, user, session)
        }
        Err(ServiceError::InvalidCredentials) => {
            state.rate_limiter.record_login_failure(&identifier).await;
            Err(ServiceError::InvalidCredentials.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn revoke_current(state: &AppState, headers: &HeaderMap) -> Result<HeaderMap, ApiError> {
    let cookie_name = &state.session_config.cookie_name;
    if let Some(token) = extract_session_token(headers, cookie_name) {
        state.auth.logout(&token).await?;
    }
    set_cookie_headers(&clear_cookie(cookie_name))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let response_headers = revoke_current(&state, &headers).await?;
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// POST /api/v1/auth/guest
pub async fn guest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let response_headers = revoke_current(&state, &headers).await?;
    Ok((
        response_headers,
        Json(serde_json::json!({
            "guest": true,
            "message": "Continuing as guest",
        })),
    ))
}

/// GET /api/v1/auth/me
pub async fn me(auth: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        user: auth.user.into(),
        expires_at: auth.session.expires_at,
    })
}
