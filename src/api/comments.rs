//! Comment API endpoints
//!
//! - POST /api/v1/posts/{id}/comments - Comment on a post

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};

/// Request body for creating a comment
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// POST /api/v1/posts/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(post_id): Path<i64>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .forum
        .create_comment(post_id, auth.user.id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
