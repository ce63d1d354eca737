//! Reaction ledger
//!
//! Validates reaction requests and applies the like/dislike toggle:
//!
//! | stored | requested | result            |
//! |--------|-----------|-------------------|
//! | none   | v         | insert v          |
//! | v      | v         | delete            |
//! | -v     | v         | update to v       |

use crate::db::repositories::ReactionRepository;
use crate::models::{ReactionCounts, ReactionOutcome, ReactionTarget, ReactionValue, TargetType};
use crate::services::error::{with_timeout, ServiceError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Like/dislike toggle over a `ReactionRepository`
pub struct ReactionLedger {
    repo: Arc<dyn ReactionRepository>,
    query_timeout: Duration,
}

impl ReactionLedger {
    pub fn new(repo: Arc<dyn ReactionRepository>, query_timeout: Duration) -> Self {
        Self {
            repo,
            query_timeout,
        }
    }

    /// Toggle a user's reaction on a post or comment.
    ///
    /// # Errors
    ///
    /// - `InvalidTarget` if `target_type` is not post/comment or `target_id <= 0`
    /// - `InvalidValue` if `value` is not +1 or -1
    pub async fn set_reaction(
        &self,
        user_id: i64,
        target_type: &str,
        target_id: i64,
        value: i64,
    ) -> Result<ReactionOutcome, ServiceError> {
        let target = parse_target(target_type, target_id)?;
        let value = ReactionValue::try_from(value).map_err(|_| ServiceError::InvalidValue(value))?;

        let outcome = with_timeout(self.query_timeout, self.repo.toggle(user_id, target, value)).await?;
        tracing::debug!(
            "Reaction {:?} by user {} on {} {}",
            outcome,
            user_id,
            target.target_type,
            target.target_id
        );
        Ok(outcome)
    }

    /// Likes and dislikes on a target
    pub async fn count_reactions(&self, target: ReactionTarget) -> Result<ReactionCounts, ServiceError> {
        with_timeout(self.query_timeout, self.repo.counts(target)).await
    }

    /// The viewer's current reaction on a target
    pub async fn reaction_of(
        &self,
        user_id: i64,
        target: ReactionTarget,
    ) -> Result<Option<ReactionValue>, ServiceError> {
        with_timeout(self.query_timeout, self.repo.get(user_id, target)).await
    }
}

/// Parse and check a reaction target
pub fn parse_target(target_type: &str, target_id: i64) -> Result<ReactionTarget, ServiceError> {
    let target_type = TargetType::from_str(target_type).map_err(ServiceError::InvalidTarget)?;
    if target_id <= 0 {
        return Err(ServiceError::InvalidTarget(format!(
            "target id must be positive, got {}",
            target_id
        )));
    }
    Ok(ReactionTarget::new(target_type, target_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryReactionRepository;
    use crate::db::repositories::SqlxReactionRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use chrono::Utc;

    const TIMEOUT: Duration = Duration::from_secs(4);

    async fn sqlite_ledger(users: i64) -> (DynDatabasePool, Arc<ReactionLedger>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        for id in 1..=users {
            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, 'hash', ?)",
            )
            .bind(id)
            .bind(format!("user{}", id))
            .bind(format!("user{}@example.com", id))
            .bind(Utc::now())
            .execute(pool.as_sqlite())
            .await
            .expect("Failed to create test user");
        }
        let ledger = ReactionLedger::new(SqlxReactionRepository::boxed(pool.clone()), TIMEOUT);
        (pool, Arc::new(ledger))
    }

    async fn rows_for(pool: &DynDatabasePool, user_id: i64) -> Vec<i64> {
        sqlx::query_scalar("SELECT value FROM reactions WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(pool.as_sqlite())
            .await
            .expect("Failed to read reactions")
    }

    #[tokio::test]
    async fn test_like_like_leaves_no_row() {
        let (pool, ledger) = sqlite_ledger(1).await;

        assert_eq!(ledger.set_reaction(1, "post", 5, 1).await.unwrap(), ReactionOutcome::Added);
        assert_eq!(ledger.set_reaction(1, "post", 5, 1).await.unwrap(), ReactionOutcome::Removed);
        assert!(rows_for(&pool, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_like_dislike_leaves_dislike() {
        let (pool, ledger) = sqlite_ledger(1).await;

        ledger.set_reaction(1, "comment", 2, 1).await.unwrap();
        let outcome = ledger.set_reaction(1, "comment", 2, -1).await.unwrap();

        assert_eq!(outcome, ReactionOutcome::Switched);
        assert_eq!(rows_for(&pool, 1).await, vec![-1]);
    }

    #[tokio::test]
    async fn test_n_users_like() {
        let (_pool, ledger) = sqlite_ledger(6).await;
        for user_id in 1..=6 {
            ledger.set_reaction(user_id, "post", 1, 1).await.unwrap();
        }

        let counts = ledger.count_reactions(ReactionTarget::post(1)).await.unwrap();
        assert_eq!(counts, ReactionCounts { likes: 6, dislikes: 0 });
    }

    #[tokio::test]
    async fn test_concurrent_identical_toggles() {
        let (pool, ledger) = sqlite_ledger(1).await;

        let (a, b) = tokio::join!(
            ledger.set_reaction(1, "post", 3, 1),
            ledger.set_reaction(1, "post", 3, 1)
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, ReactionOutcome::Removed));

        assert_eq!(outcomes, vec![ReactionOutcome::Added, ReactionOutcome::Removed]);
        assert!(rows_for(&pool, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let ledger = ReactionLedger::new(MemoryReactionRepository::boxed(), TIMEOUT);

        let err = ledger.set_reaction(1, "user", 1, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTarget(_)));

        let err = ledger.set_reaction(1, "post", 0, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTarget(_)));

        let err = ledger.set_reaction(1, "post", -3, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTarget(_)));

        let err = ledger.set_reaction(1, "post", 1, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidValue(0)));

        let err = ledger.set_reaction(1, "comment", 1, 2).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidValue(2)));
    }

    #[tokio::test]
    async fn test_target_type_is_case_insensitive() {
        let ledger = ReactionLedger::new(MemoryReactionRepository::boxed(), TIMEOUT);
        ledger.set_reaction(1, "POST", 1, -1).await.unwrap();

        assert_eq!(
            ledger.reaction_of(1, ReactionTarget::post(1)).await.unwrap(),
            Some(ReactionValue::Dislike)
        );
    }
}
