//! Session repository
//!
//! Database operations for user sessions. A user owns at most one session
//! row: `replace_for_user` swaps it inside a single transaction.

use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Delete every session of `session.user_id`, then insert `session`.
    /// Both steps commit together or not at all.
    async fn replace_for_user(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Move the expiry of a session. Returns false if the row is gone.
    async fn update_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    /// Delete a session. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete sessions with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<i64>;

    /// Count sessions belonging to a user
    async fn count_for_user(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn replace_for_user(&self, session: &Session) -> Result<Session> {
        let _guard = self.pool.write_lock().lock().await;
        replace_session_sqlite(self.pool.as_sqlite(), session).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        get_session_by_id_sqlite(self.pool.as_sqlite(), id).await
    }

    async fn update_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let _guard = self.pool.write_lock().lock().await;
        update_session_expiry_sqlite(self.pool.as_sqlite(), id, expires_at).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.pool.write_lock().lock().await;
        delete_session_sqlite(self.pool.as_sqlite(), id).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<i64> {
        let _guard = self.pool.write_lock().lock().await;
        delete_expired_sessions_sqlite(self.pool.as_sqlite(), now).await
    }

    async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool.as_sqlite())
            .await
            .context("Failed to count sessions")?;
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn replace_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin session transaction")?;

    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(session.user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete previous sessions")?;

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create session")?;

    tx.commit().await.context("Failed to commit session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_session_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn update_session_expiry_sqlite(
    pool: &SqlitePool,
    id: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update session expiry")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_session_sqlite(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete session")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_expired_sessions_sqlite(pool: &SqlitePool, now: DateTime<Utc>) -> Result<i64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired sessions")?;

    Ok(result.rows_affected() as i64)
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, Arc<dyn SessionRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::boxed(pool.clone());
        (pool, repo)
    }

    // Helper to create a test user for foreign key constraint
    async fn create_test_user(pool: &DynDatabasePool, id: i64) {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("user{}", id))
        .bind(format!("user{}@example.com", id))
        .bind("hash")
        .bind(Utc::now())
        .execute(pool.as_sqlite())
        .await
        .expect("Failed to create test user");
    }

    #[tokio::test]
    async fn test_replace_and_get_session() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = Session::issue(1, Duration::hours(1));
        repo.replace_for_user(&session)
            .await
            .expect("Failed to create session");

        let found = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get session")
            .expect("Session should exist");
        assert_eq!(found.user_id, 1);
        assert_eq!(found.id, session.id);
    }

    #[tokio::test]
    async fn test_replace_removes_previous_session() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let first = Session::issue(1, Duration::hours(1));
        let second = Session::issue(1, Duration::hours(1));
        repo.replace_for_user(&first).await.expect("Failed to create session");
        repo.replace_for_user(&second).await.expect("Failed to create session");

        assert!(repo.get_by_id(&first.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&second.id).await.unwrap().is_some());
        assert_eq!(repo.count_for_user(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_does_not_touch_other_users() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;
        create_test_user(&pool, 2).await;

        let a = Session::issue(1, Duration::hours(1));
        let b = Session::issue(2, Duration::hours(1));
        repo.replace_for_user(&a).await.unwrap();
        repo.replace_for_user(&b).await.unwrap();

        assert!(repo.get_by_id(&a.id).await.unwrap().is_some());
        assert!(repo.get_by_id(&b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_delete() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let first = Session::issue(1, Duration::hours(1));
        repo.replace_for_user(&first).await.unwrap();

        // A token owned by another user makes the insert fail after the delete.
        create_test_user(&pool, 2).await;
        let other = Session::issue(2, Duration::hours(1));
        repo.replace_for_user(&other).await.unwrap();

        let mut clash = Session::issue(1, Duration::hours(1));
        clash.id = other.id.clone();
        assert!(repo.replace_for_user(&clash).await.is_err());

        // User 1's original session survived the failed replacement.
        assert!(repo.get_by_id(&first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_replace_leaves_one_session() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.replace_for_user(&Session::issue(1, Duration::hours(1)))
                        .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.expect("Task panicked").expect("Replace failed");
        }

        assert_eq!(repo.count_for_user(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_expiry() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = Session::issue(1, Duration::hours(1));
        repo.replace_for_user(&session).await.unwrap();

        let later = session.expires_at + Duration::hours(2);
        assert!(repo.update_expiry(&session.id, later).await.unwrap());
        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.expires_at, later);

        assert!(!repo.update_expiry("missing", later).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = Session::issue(1, Duration::hours(1));
        repo.replace_for_user(&session).await.unwrap();

        assert!(repo.delete(&session.id).await.unwrap());
        assert!(!repo.delete(&session.id).await.unwrap());
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;
        create_test_user(&pool, 2).await;

        let expired = Session::issue(1, Duration::seconds(-10));
        let live = Session::issue(2, Duration::hours(1));
        repo.replace_for_user(&expired).await.unwrap();
        repo.replace_for_user(&live).await.unwrap();

        let deleted = repo.delete_expired(Utc::now()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get_by_id(&expired.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sessions_cascade_with_user() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = Session::issue(1, Duration::hours(1));
        repo.replace_for_user(&session).await.unwrap();

        pool.execute("DELETE FROM users WHERE id = 1").await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }
}
