//! API layer - HTTP handlers and routing
//!
//! JSON endpoints under `/api/v1`:
//! - Auth: register, login, logout, guest, me
//! - Posts, comments and categories
//! - Reactions
//! - Health check

pub mod auth;
pub mod categories;
pub mod comments;
pub mod middleware;
pub mod posts;
pub mod reactions;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api/v1` routes
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Routes that need a signed-in user
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/posts", post(posts::create_post))
        .route("/posts/{id}/comments", post(comments::create_comment))
        .route("/reactions", post(reactions::toggle_reaction))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Routes that read the identity when there is one
    let viewer_routes = Router::new()
        .route("/posts", get(posts::list_posts))
        .route("/posts/{id}", get(posts::get_post))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ));

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/guest", post(auth::guest))
        .route("/categories", get(categories::list_categories))
        .route(
            "/reactions/{target_type}/{target_id}",
            get(reactions::get_counts),
        )
        .route("/health", get(health))
        .merge(viewer_routes)
        .merge(protected_routes)
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    match tokio::time::timeout(state.request_timeout, state.pool.ping()).await {
        Ok(Ok(())) => Ok(Json(serde_json::json!({ "status": "ok" }))),
        Ok(Err(e)) => {
            tracing::warn!("Health check failed: {:#}", e);
            Err(ApiError::new("TRANSIENT", "Database unavailable"))
        }
        Err(_) => Err(ApiError::new("TIMEOUT", "Database did not answer")),
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_timeout,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(TraceLayer::new_for_http());

    // CORS with credentials so the session cookie travels
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            let cors = CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
                .allow_credentials(true);
            router = router.layer(cors);
        }
        Err(_) => tracing::warn!("Ignoring invalid CORS origin: {}", cors_origin),
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ExpiryPolicy};
    use crate::db::{create_test_pool, migrations};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app_with(config: Config) -> Router {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, &config);
        build_router(state, &config.server.cors_origin)
    }

    async fn test_app() -> Router {
        test_app_with(Config::default()).await
    }

    fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("Failed to build request")
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).expect("Failed to build request")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        serde_json::from_slice(&bytes).expect("Body should be JSON")
    }

    /// `name=value` part of the response's Set-Cookie header
    fn session_cookie_pair(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .expect("Response should set a cookie")
            .to_string()
    }

    async fn register(app: &Router, username: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "secret123",
                    "confirm_password": "secret123",
                }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        session_cookie_pair(&response)
    }

    async fn login(app: &Router, identifier: &str, password: &str) -> Response {
        app.clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                json!({ "identifier": identifier, "password": password }),
                None,
            ))
            .await
            .unwrap()
    }

    async fn create_post(app: &Router, cookie: &str, categories: Value) -> i64 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/posts",
                json!({ "title": "Hello", "content": "World", "categories": categories }),
                Some(cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_i64().expect("post id")
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let response = app.oneshot(get_request("/api/v1/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_sets_session_and_me_works() {
        let app = test_app().await;
        let cookie = register(&app, "alice").await;
        assert!(cookie.starts_with("session="));

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["username"], "alice");
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_bearer_token_is_accepted() {
        let app = test_app().await;
        register(&app, "bearer").await;
        let response = login(&app, "bearer", "secret123").await;
        let token = body_json(response).await["token"]
            .as_str()
            .expect("token")
            .to_string();

        let request = Request::builder()
            .uri("/api/v1/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_me_without_session_is_auth_required() {
        let app = test_app().await;
        let response = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", Some("session=bogus")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
        assert_eq!(body["error"]["message"], "Please sign in to continue.");
    }

    #[tokio::test]
    async fn test_register_password_mismatch() {
        let app = test_app().await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                json!({
                    "username": "bob",
                    "email": "bob@example.com",
                    "password": "secret123",
                    "confirm_password": "secret124",
                }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let app = test_app().await;
        register(&app, "carol").await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                json!({
                    "username": "carol",
                    "email": "carol2@example.com",
                    "password": "secret123",
                    "confirm_password": "secret123",
                }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_new_login_invalidates_old_cookie() {
        let app = test_app().await;
        let first = register(&app, "dave").await;

        let response = login(&app, "dave@example.com", "secret123").await;
        assert_eq!(response.status(), StatusCode::OK);
        let second = session_cookie_pair(&response);

        let old = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", Some(&first)))
            .await
            .unwrap();
        assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

        let new = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", Some(&second)))
            .await
            .unwrap();
        assert_eq!(new.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let app = test_app().await;
        register(&app, "erin").await;

        let wrong_password = login(&app, "erin", "not-it").await;
        let unknown_user = login(&app, "nobody", "secret123").await;
        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong_password).await, body_json(unknown_user).await);
    }

    #[tokio::test]
    async fn test_login_throttled_after_failures() {
        let mut config = Config::default();
        config.rate_limit.login_failures = 2;
        let app = test_app_with(config).await;
        register(&app, "frank").await;

        for _ in 0..2 {
            assert_eq!(
                login(&app, "frank", "wrong-password").await.status(),
                StatusCode::UNAUTHORIZED
            );
        }
        let response = login(&app, "frank", "secret123").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let app = test_app().await;
        let cookie = register(&app, "gina").await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(json_request("POST", "/api/v1/auth/logout", json!({}), Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            let set_cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            assert!(set_cookie.contains("Max-Age=0"));
        }

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guest_clears_session() {
        let app = test_app().await;
        let cookie = register(&app, "hank").await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/auth/guest", json!({}), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["guest"], true);

        let response = app
            .oneshot(get_request("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_posts_and_comments_flow() {
        let app = test_app().await;
        let cookie = register(&app, "ivy").await;

        let anonymous = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/posts",
                json!({ "title": "t", "content": "c" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let post_id = create_post(&app, &cookie, json!(["rust", "news"])).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/posts/{}/comments", post_id),
                json!({ "content": "first!" }),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/v1/posts/{}", post_id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["post"]["author"], "ivy");
        assert_eq!(body["comments"][0]["content"], "first!");

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/posts?category=news", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().map(Vec::len), Some(1));

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/categories", None))
            .await
            .unwrap();
        let names: Vec<String> = body_json(response)
            .await
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|c| c["name"].as_str().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["news".to_string(), "rust".to_string()]);

        let response = app
            .oneshot(get_request("/api/v1/posts/9999", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mine_filter_requires_sign_in() {
        let app = test_app().await;
        let response = app
            .clone()
            .oneshot(get_request("/api/v1/posts?mine=1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cookie = register(&app, "jack").await;
        create_post(&app, &cookie, json!([])).await;
        let response = app
            .oneshot(get_request("/api/v1/posts?mine=1", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_reaction_toggle_over_http() {
        let app = test_app().await;
        let cookie = register(&app, "kate").await;
        let post_id = create_post(&app, &cookie, json!([])).await;

        let toggle = |value: i64| {
            json_request(
                "POST",
                "/api/v1/reactions",
                json!({ "target_type": "post", "target_id": post_id, "value": value }),
                Some(&cookie),
            )
        };

        let body = body_json(app.clone().oneshot(toggle(1)).await.unwrap()).await;
        assert_eq!(body["outcome"], "added");
        assert_eq!(body["counts"]["likes"], 1);

        let body = body_json(app.clone().oneshot(toggle(-1)).await.unwrap()).await;
        assert_eq!(body["outcome"], "switched");
        assert_eq!(body["value"], "dislike");
        assert_eq!(body["counts"]["dislikes"], 1);

        let body = body_json(app.clone().oneshot(toggle(-1)).await.unwrap()).await;
        assert_eq!(body["outcome"], "removed");
        assert_eq!(body["value"], Value::Null);

        let response = app
            .oneshot(get_request(&format!("/api/v1/reactions/post/{}", post_id), None))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body, json!({ "likes": 0, "dislikes": 0 }));
    }

    #[tokio::test]
    async fn test_reaction_errors() {
        let app = test_app().await;
        let cookie = register(&app, "liam").await;
        let post_id = create_post(&app, &cookie, json!([])).await;

        let cases = [
            (json!({ "target_type": "user", "target_id": 1, "value": 1 }), "INVALID_TARGET"),
            (json!({ "target_type": "post", "target_id": 0, "value": 1 }), "INVALID_TARGET"),
            (json!({ "target_type": "post", "target_id": post_id, "value": 5 }), "INVALID_VALUE"),
            (json!({ "target_type": "comment", "target_id": 777, "value": 1 }), "NOT_FOUND"),
        ];
        for (body, code) in cases {
            let response = app
                .clone()
                .oneshot(json_request("POST", "/api/v1/reactions", body, Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(body_json(response).await["error"]["code"], code);
        }

        let anonymous = app
            .oneshot(json_request(
                "POST",
                "/api/v1/reactions",
                json!({ "target_type": "post", "target_id": post_id, "value": 1 }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sliding_policy_refreshes_cookie() {
        let mut config = Config::default();
        config.session.expiry_policy = ExpiryPolicy::Sliding;
        let app = test_app_with(config).await;
        let cookie = register(&app, "mona").await;

        let response = app
            .oneshot(get_request("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(session_cookie_pair(&response), cookie);
    }

    #[tokio::test]
    async fn test_fixed_policy_does_not_reissue_cookie() {
        let app = test_app().await;
        let cookie = register(&app, "nina").await;

        let response = app
            .oneshot(get_request("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_ip_rate_limit() {
        let mut config = Config::default();
        config.rate_limit.requests_per_minute = 2;
        let app = test_app_with(config).await;

        let request = || {
            Request::builder()
                .uri("/api/v1/health")
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(request()).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.clone().oneshot(request()).await.unwrap().status(), StatusCode::OK);
        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
