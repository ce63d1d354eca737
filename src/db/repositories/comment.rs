//! Comment repository

use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentView, ReactionCounts};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a comment on a post
    async fn create(&self, post_id: i64, author_id: i64, content: &str) -> Result<Comment>;

    /// Comments of a post, oldest first
    async fn list_by_post(&self, post_id: i64) -> Result<Vec<CommentView>>;

    /// Check if a comment exists
    async fn exists(&self, id: i64) -> Result<bool>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    /// Create a new SQLx comment repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, post_id: i64, author_id: i64, content: &str) -> Result<Comment> {
        let _guard = self.pool.write_lock().lock().await;
        create_comment_sqlite(self.pool.as_sqlite(), post_id, author_id, content).await
    }

    async fn list_by_post(&self, post_id: i64) -> Result<Vec<CommentView>> {
        list_comments_by_post_sqlite(self.pool.as_sqlite(), post_id).await
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool.as_sqlite())
            .await
            .context("Failed to check comment existence")?;
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_comment_sqlite(
    pool: &SqlitePool,
    post_id: i64,
    author_id: i64,
    content: &str,
) -> Result<Comment> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO comments (post_id, author_id, content, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(author_id)
    .bind(content)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_rowid(),
        post_id,
        author_id,
        content: content.to_string(),
        created_at: now,
    })
}

async fn list_comments_by_post_sqlite(pool: &SqlitePool, post_id: i64) -> Result<Vec<CommentView>> {
    let rows = sqlx::query(
        r#"
        SELECT
            c.id, c.post_id, c.author_id, u.username AS author, c.content, c.created_at,
            (SELECT COUNT(*) FROM reactions r
                WHERE r.target_type = 'comment' AND r.target_id = c.id AND r.value = 1) AS likes,
            (SELECT COUNT(*) FROM reactions r
                WHERE r.target_type = 'comment' AND r.target_id = c.id AND r.value = -1) AS dislikes
        FROM comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.post_id = ?
        ORDER BY c.created_at ASC, c.id ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to list comments")?;

    rows.iter().map(row_to_comment_view_sqlite).collect()
}

fn row_to_comment_view_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<CommentView> {
    Ok(CommentView {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author: row.get("author"),
        content: row.get("content"),
        reactions: ReactionCounts {
            likes: row.get("likes"),
            dislikes: row.get("dislikes"),
        },
        created_at: row.get("created_at"),
    })
}
