//! Reaction API endpoints
//!
//! - POST /api/v1/reactions - Toggle a like (+1) or dislike (-1)
//! - GET /api/v1/reactions/{target_type}/{target_id} - Counts for a target

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ReactionCounts, ReactionOutcome, ReactionValue};
use crate::services::reaction::parse_target;
use crate::services::ServiceError;

/// Request body for toggling a reaction
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub target_type: String,
    pub target_id: i64,
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub outcome: ReactionOutcome,
    /// The caller's reaction after the toggle
    pub value: Option<ReactionValue>,
    pub counts: ReactionCounts,
}

/// POST /api/v1/reactions
pub async fn toggle_reaction(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let target = parse_target(&body.target_type, body.target_id)?;
    ReactionValue::try_from(body.value).map_err(|_| ServiceError::InvalidValue(body.value))?;
    state.forum.ensure_target_exists(target).await?;

    let outcome = state
        .ledger
        .set_reaction(auth.user.id, &body.target_type, body.target_id, body.value)
        .await?;
    let value = state.ledger.reaction_of(auth.user.id, target).await?;
    let counts = state.ledger.count_reactions(target).await?;

    Ok(Json(ReactionResponse {
        outcome,
        value,
        counts,
    }))
}

/// GET /api/v1/reactions/{target_type}/{target_id}
pub async fn get_counts(
    State(state): State<AppState>,
    Path((target_type, target_id)): Path<(String, i64)>,
) -> Result<Json<ReactionCounts>, ApiError> {
    let target = parse_target(&target_type, target_id)?;
    Ok(Json(state.ledger.count_reactions(target).await?))
}
