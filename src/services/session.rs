//! Session manager
//!
//! Creates, resolves and revokes login sessions. A user has at most one
//! session: creating a new one removes the old one in the same transaction.
//! Expiry is checked lazily when a token is resolved.

use crate::config::{ExpiryPolicy, SessionConfig};
use crate::db::repositories::SessionRepository;
use crate::models::Session;
use crate::services::error::{with_timeout, ServiceError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Session lifecycle over a `SessionRepository`
pub struct SessionManager {
    repo: Arc<dyn SessionRepository>,
    ttl: Duration,
    policy: ExpiryPolicy,
    query_timeout: StdDuration,
}

impl SessionManager {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        config: &SessionConfig,
        query_timeout: StdDuration,
    ) -> Self {
        Self {
            repo,
            ttl: config.ttl(),
            policy: config.expiry_policy,
            query_timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Start a session for `user_id`, invalidating any previous one
    pub async fn create_session(&self, user_id: i64) -> Result<Session, ServiceError> {
        let session = Session::issue(user_id, self.ttl);
        let session = with_timeout(self.query_timeout, self.repo.replace_for_user(&session)).await?;
        tracing::debug!("Session created for user {}", user_id);
        Ok(session)
    }

    /// Look up a token.
    ///
    /// Unknown and expired tokens give `None`; an expired row is deleted.
    /// Under the sliding policy a live session gets `expires_at = now + ttl`.
    pub async fn resolve(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        let Some(mut session) = with_timeout(self.query_timeout, self.repo.get_by_id(token)).await?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            with_timeout(self.query_timeout, self.repo.delete(&session.id)).await?;
            tracing::debug!("Expired session removed for user {}", session.user_id);
            return Ok(None);
        }

        if self.policy == ExpiryPolicy::Sliding {
            let expires_at = now + self.ttl;
            let updated = with_timeout(
                self.query_timeout,
                self.repo.update_expiry(&session.id, expires_at),
            )
            .await?;
            // Superseded by a concurrent login between the read and the update
            if !updated {
                return Ok(None);
            }
            session.expires_at = expires_at;
        }

        Ok(Some(session))
    }

    /// Delete a session. Unknown tokens are ignored.
    pub async fn revoke(&self, token: &str) -> Result<(), ServiceError> {
        let removed = with_timeout(self.query_timeout, self.repo.delete(token)).await?;
        if removed {
            tracing::debug!("Session revoked");
        }
        Ok(())
    }

    /// Delete every expired session, returning how many were removed
    pub async fn cleanup_expired(&self) -> Result<i64, ServiceError> {
        let count = with_timeout(self.query_timeout, self.repo.delete_expired(Utc::now())).await?;
        if count > 0 {
            tracing::info!("Removed {} expired session(s)", count);
        }
        Ok(count)
    }
}
