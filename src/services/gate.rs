//! Request gate
//!
//! Turns the token a request carries into an identity. Handlers that need a
//! signed-in user go through `require_auth`; everything else may ask for the
//! optional identity.

use crate::db::repositories::UserRepository;
use crate::models::{Session, User};
use crate::services::error::{with_timeout, ServiceError};
use crate::services::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;

pub struct RequestGate {
    sessions: Arc<SessionManager>,
    users: Arc<dyn UserRepository>,
    query_timeout: Duration,
}

impl RequestGate {
    pub fn new(
        sessions: Arc<SessionManager>,
        users: Arc<dyn UserRepository>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            query_timeout,
        }
    }

    /// Resolve an optional token. Absent, unknown and expired all give `None`.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Option<Session>, ServiceError> {
        match token {
            Some(token) if !token.is_empty() => self.sessions.resolve(token).await,
            _ => Ok(None),
        }
    }

    /// Like `authenticate`, but a missing session is `AuthenticationRequired`
    pub async fn require_auth(&self, token: Option<&str>) -> Result<Session, ServiceError> {
        self.authenticate(token)
            .await?
            .ok_or(ServiceError::AuthenticationRequired)
    }

    /// Resolve the token and load its user
    pub async fn current_user(
        &self,
        token: Option<&str>,
    ) -> Result<Option<(User, Session)>, ServiceError> {
        let Some(session) = self.authenticate(token).await? else {
            return Ok(None);
        };
        let user = with_timeout(self.query_timeout, self.users.get_by_id(session.user_id)).await?;
        Ok(user.map(|user| (user, session)))
    }
}
