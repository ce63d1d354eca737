//! Reaction repository
//!
//! Stores at most one reaction per (user, target type, target id) and applies
//! the like/dislike toggle as a single read-decide-write transaction.

use crate::db::DynDatabasePool;
use crate::models::{ReactionCounts, ReactionOutcome, ReactionTarget, ReactionValue};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Reaction repository trait
#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Apply a toggle for `user_id` on `target` and report what happened
    async fn toggle(
        &self,
        user_id: i64,
        target: ReactionTarget,
        value: ReactionValue,
    ) -> Result<ReactionOutcome>;

    /// The reaction a user currently holds on a target
    async fn get(&self, user_id: i64, target: ReactionTarget) -> Result<Option<ReactionValue>>;

    /// Likes and dislikes on a target
    async fn counts(&self, target: ReactionTarget) -> Result<ReactionCounts>;
}

/// SQLx-based reaction repository implementation
pub struct SqlxReactionRepository {
    pool: DynDatabasePool,
}

impl SqlxReactionRepository {
    /// Create a new SQLx reaction repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReactionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReactionRepository for SqlxReactionRepository {
    async fn toggle(
        &self,
        user_id: i64,
        target: ReactionTarget,
        value: ReactionValue,
    ) -> Result<ReactionOutcome> {
        let _guard = self.pool.write_lock().lock().await;
        toggle_reaction_sqlite(self.pool.as_sqlite(), user_id, target, value).await
    }

    async fn get(&self, user_id: i64, target: ReactionTarget) -> Result<Option<ReactionValue>> {
        get_reaction_sqlite(self.pool.as_sqlite(), user_id, target).await
    }

    async fn counts(&self, target: ReactionTarget) -> Result<ReactionCounts> {
        count_reactions_sqlite(self.pool.as_sqlite(), target).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn toggle_reaction_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    target: ReactionTarget,
    value: ReactionValue,
) -> Result<ReactionOutcome> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin reaction transaction")?;

    let stored: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT value FROM reactions
        WHERE user_id = ? AND target_type = ? AND target_id = ?
        "#,
    )
    .bind(user_id)
    .bind(target.target_type.as_str())
    .bind(target.target_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to read reaction")?;

    let stored = stored.map(ReactionValue::try_from).transpose().map_err(|e| anyhow!(e))?;
    let outcome = ReactionOutcome::decide(stored, value);

    match outcome {
        ReactionOutcome::Added => {
            sqlx::query(
                r#"
                INSERT INTO reactions (user_id, target_type, target_id, value, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(target.target_type.as_str())
            .bind(target.target_id)
            .bind(value.as_i64())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to insert reaction")?;
        }
        ReactionOutcome::Removed => {
            sqlx::query(
                "DELETE FROM reactions WHERE user_id = ? AND target_type = ? AND target_id = ?",
            )
            .bind(user_id)
            .bind(target.target_type.as_str())
            .bind(target.target_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete reaction")?;
        }
        ReactionOutcome::Switched => {
            sqlx::query(
                r#"
                UPDATE reactions SET value = ?
                WHERE user_id = ? AND target_type = ? AND target_id = ?
                "#,
            )
            .bind(value.as_i64())
            .bind(user_id)
            .bind(target.target_type.as_str())
            .bind(target.target_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update reaction")?;
        }
    }

    tx.commit().await.context("Failed to commit reaction")?;
    Ok(outcome)
}

async fn get_reaction_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    target: ReactionTarget,
) -> Result<Option<ReactionValue>> {
    let stored: Option<i64> = sqlx::query_scalar(
        "SELECT value FROM reactions WHERE user_id = ? AND target_type = ? AND target_id = ?",
    )
    .bind(user_id)
    .bind(target.target_type.as_str())
    .bind(target.target_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get reaction")?;

    stored.map(ReactionValue::try_from).transpose().map_err(|e| anyhow!(e))
}

async fn count_reactions_sqlite(pool: &SqlitePool, target: ReactionTarget) -> Result<ReactionCounts> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN value = 1 THEN 1 ELSE 0 END), 0) AS likes,
            COALESCE(SUM(CASE WHEN value = -1 THEN 1 ELSE 0 END), 0) AS dislikes
        FROM reactions
        WHERE target_type = ? AND target_id = ?
        "#,
    )
    .bind(target.target_type.as_str())
    .bind(target.target_id)
    .fetch_one(pool)
    .await
    .context("Failed to count reactions")?;

    Ok(ReactionCounts {
        likes: row.get("likes"),
        dislikes: row.get("dislikes"),
    })
}
