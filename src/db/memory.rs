//! In-memory repositories
//!
//! Map-backed implementations of the session, user and reaction repositories.
//! Each one guards its state with a single async mutex, which gives the same
//! all-or-nothing behaviour the SQLite versions get from transactions.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::repositories::{ReactionRepository, SessionRepository, UserRepository};
use crate::models::{ReactionCounts, ReactionOutcome, ReactionTarget, ReactionValue, Session, User};

/// Uniqueness failure raised by the in-memory stores, the counterpart of a
/// SQLite UNIQUE / PRIMARY KEY violation
#[derive(Debug, thiserror::Error)]
#[error("UNIQUE constraint failed: {0}")]
pub struct UniqueViolation(pub &'static str);

/// Sessions keyed by token
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Arc<dyn SessionRepository> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn replace_for_user(&self, session: &Session) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.id) {
            return Err(UniqueViolation("sessions.id").into());
        }
        sessions.retain(|_, s| s.user_id != session.user_id);
        sessions.insert(session.id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().await.get(id).cloned())
    }

    async fn update_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        match self.sessions.lock().await.get_mut(id) {
            Some(session) => {
                session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.lock().await.remove(id).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<i64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - sessions.len()) as i64)
    }

    async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.values().filter(|s| s.user_id == user_id).count() as i64)
    }
}

/// Users in insertion order; IDs start at 1
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Arc<dyn UserRepository> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let mut users = self.users.lock().await;
        if users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(UniqueViolation("users").into());
        }
        let mut created = user.clone();
        created.id = users.len() as i64 + 1;
        users.push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn identity_taken(&self, value: &str) -> Result<bool> {
        let users = self.users.lock().await;
        Ok(users.iter().any(|u| u.username == value || u.email == value))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.users.lock().await.len() as i64)
    }
}

/// Reactions keyed by (user, target)
#[derive(Default)]
pub struct MemoryReactionRepository {
    reactions: Mutex<HashMap<(i64, ReactionTarget), ReactionValue>>,
}

impl MemoryReactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Arc<dyn ReactionRepository> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ReactionRepository for MemoryReactionRepository {
    async fn toggle(
        &self,
        user_id: i64,
        target: ReactionTarget,
        value: ReactionValue,
    ) -> Result<ReactionOutcome> {
        let mut reactions = self.reactions.lock().await;
        let key = (user_id, target);
        let outcome = ReactionOutcome::decide(reactions.get(&key).copied(), value);
        match outcome.resulting_value(value) {
            Some(stored) => reactions.insert(key, stored),
            None => reactions.remove(&key),
        };
        Ok(outcome)
    }

    async fn get(&self, user_id: i64, target: ReactionTarget) -> Result<Option<ReactionValue>> {
        Ok(self.reactions.lock().await.get(&(user_id, target)).copied())
    }

    async fn counts(&self, target: ReactionTarget) -> Result<ReactionCounts> {
        let reactions = self.reactions.lock().await;
        let mut counts = ReactionCounts::default();
        for value in reactions
            .iter()
            .filter(|((_, t), _)| *t == target)
            .map(|(_, v)| v)
        {
            match value {
                ReactionValue::Like => counts.likes += 1,
                ReactionValue::Dislike => counts.dislikes += 1,
            }
        }
        Ok(counts)
    }
}
