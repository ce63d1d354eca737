//! Category API endpoints
//!
//! - GET /api/v1/categories - All categories by name

use axum::{extract::State, Json};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Category;

/// GET /api/v1/categories
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.forum.list_categories().await?))
}
