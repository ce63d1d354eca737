//! Post repository
//!
//! Posts are written together with their category links in one transaction.
//! Listings join in the author name, category names and reaction counts.

use crate::db::DynDatabasePool;
use crate::models::{
    normalize_category_names, CreatePostInput, Post, PostFilter, PostView, ReactionCounts,
    POST_LIST_LIMIT,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Separator used when aggregating category names
const CATEGORY_SEPARATOR: char = '\u{1f}';

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a post and link its categories, creating unknown ones
    async fn create(&self, author_id: i64, input: &CreatePostInput) -> Result<Post>;

    /// List posts matching a filter, newest first
    async fn list(&self, filter: &PostFilter) -> Result<Vec<PostView>>;

    /// Get one post with author, categories and counts
    async fn get_view(&self, id: i64) -> Result<Option<PostView>>;

    /// Check if a post exists
    async fn exists(&self, id: i64) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    /// Create a new SQLx post repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, author_id: i64, input: &CreatePostInput) -> Result<Post> {
        let _guard = self.pool.write_lock().lock().await;
        create_post_sqlite(self.pool.as_sqlite(), author_id, input).await
    }

    async fn list(&self, filter: &PostFilter) -> Result<Vec<PostView>> {
        list_posts_sqlite(self.pool.as_sqlite(), filter).await
    }

    async fn get_view(&self, id: i64) -> Result<Option<PostView>> {
        get_post_view_sqlite(self.pool.as_sqlite(), id).await
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool.as_sqlite())
            .await
            .context("Failed to check post existence")?;
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const POST_VIEW_SELECT: &str = r#"
    SELECT
        p.id, p.author_id, u.username AS author, p.title, p.content, p.created_at,
        (SELECT COUNT(*) FROM reactions r
            WHERE r.target_type = 'post' AND r.target_id = p.id AND r.value = 1) AS likes,
        (SELECT COUNT(*) FROM reactions r
            WHERE r.target_type = 'post' AND r.target_id = p.id AND r.value = -1) AS dislikes,
        (SELECT GROUP_CONCAT(c.name, char(31)) FROM post_categories pc
            JOIN categories c ON c.id = pc.category_id
            WHERE pc.post_id = p.id) AS categories
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

async fn create_post_sqlite(
    pool: &SqlitePool,
    author_id: i64,
    input: &CreatePostInput,
) -> Result<Post> {
    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin post transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (author_id, title, content, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(author_id)
    .bind(&input.title)
    .bind(&input.content)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?;
    let post_id = result.last_insert_rowid();

    for name in normalize_category_names(&input.categories) {
        sqlx::query("INSERT OR IGNORE INTO categories (name) VALUES (?)")
            .bind(&name)
            .execute(&mut *tx)
            .await
            .context("Failed to create category")?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO post_categories (post_id, category_id)
            SELECT ?, id FROM categories WHERE name = ?
            "#,
        )
        .bind(post_id)
        .bind(&name)
        .execute(&mut *tx)
        .await
        .context("Failed to link post category")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    Ok(Post {
        id: post_id,
        author_id,
        title: input.title.clone(),
        content: input.content.clone(),
        created_at: now,
    })
}

async fn list_posts_sqlite(pool: &SqlitePool, filter: &PostFilter) -> Result<Vec<PostView>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(POST_VIEW_SELECT);
    builder.push(" WHERE 1 = 1");

    if let Some(author_id) = filter.author_id {
        builder.push(" AND p.author_id = ").push_bind(author_id);
    }

    if let Some(user_id) = filter.liked_by {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM reactions r WHERE r.target_type = 'post' \
                 AND r.target_id = p.id AND r.value = 1 AND r.user_id = ",
            )
            .push_bind(user_id)
            .push(")");
    }

    let categories = normalize_category_names(&filter.categories);
    if !categories.is_empty() {
        builder.push(
            " AND EXISTS (SELECT 1 FROM post_categories pc JOIN categories c \
             ON c.id = pc.category_id WHERE pc.post_id = p.id AND c.name IN (",
        );
        let mut separated = builder.separated(", ");
        for name in categories {
            separated.push_bind(name);
        }
        separated.push_unseparated("))");
    }

    builder
        .push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(POST_LIST_LIMIT);

    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    rows.iter().map(row_to_post_view_sqlite).collect()
}

async fn get_post_view_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<PostView>> {
    let sql = format!("{} WHERE p.id = ?", POST_VIEW_SELECT);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.as_ref().map(row_to_post_view_sqlite).transpose()
}

fn row_to_post_view_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<PostView> {
    let categories: Option<String> = row.get("categories");
    let mut categories: Vec<String> = categories
        .map(|joined| {
            joined
                .split(CATEGORY_SEPARATOR)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    categories.sort();

    Ok(PostView {
        id: row.get("id"),
        author_id: row.get("author_id"),
        author: row.get("author"),
        title: row.get("title"),
        content: row.get("content"),
        categories,
        reactions: ReactionCounts {
            likes: row.get("likes"),
            dislikes: row.get("dislikes"),
        },
        created_at: row.get("created_at"),
    })
}
