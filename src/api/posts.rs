//! Post API endpoints
//!
//! - GET /api/v1/posts?category=a&category=b&mine=1&liked=1 - Feed
//! - POST /api/v1/posts - Create a post
//! - GET /api/v1/posts/{id} - Post with comments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreatePostInput, PostDetail, PostView};
use crate::services::FeedOptions;

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Build feed options from raw query pairs; `category` may repeat
fn feed_options(params: &[(String, String)]) -> FeedOptions {
    let mut options = FeedOptions::default();
    for (key, value) in params {
        match key.as_str() {
            "category" | "categories" => options.categories.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            "mine" => options.mine = is_truthy(value),
            "liked" => options.liked = is_truthy(value),
            _ => {}
        }
    }
    options
}

/// GET /api/v1/posts
pub async fn list_posts(
    State(state): State<AppState>,
    viewer: Option<AuthenticatedUser>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let viewer_id = viewer.map(|v| v.user.id);
    let posts = state.forum.list_posts(feed_options(&params), viewer_id).await?;
    Ok(Json(posts))
}

/// POST /api/v1/posts
pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.forum.create_post(auth.user.id, input).await?;
    let detail = state.forum.get_post(post.id).await?;
    Ok((StatusCode::CREATED, Json(detail.post)))
}

/// GET /api/v1/posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.forum.get_post(id).await?))
}
