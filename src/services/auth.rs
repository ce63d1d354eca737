//! Auth service
//!
//! Registration and login on top of the user repository, the password
//! primitive and the session manager.

use crate::config::UniquenessPolicy;
use crate::db::repositories::UserRepository;
use crate::models::{Session, User};
use crate::services::error::{is_unique_violation, with_timeout, ServiceError};
use crate::services::password::{hash_password, verify_dummy, verify_password};
use crate::services::session::SessionManager;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 32;
const PASSWORD_MIN_LEN: usize = 6;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.@-]+$").expect("username pattern is valid"));

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Input for user login. `identifier` is a username or an email.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// Registration and login
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<SessionManager>,
    uniqueness: UniquenessPolicy,
    query_timeout: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<SessionManager>,
        uniqueness: UniquenessPolicy,
        query_timeout: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            uniqueness,
            query_timeout,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed username, email or password
    /// - `DuplicateIdentity` if the email or username is taken under the
    ///   configured uniqueness policy
    pub async fn register(&self, input: RegisterInput) -> Result<User, ServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_registration(&username, &email, &input.password)?;

        self.check_available(&username, &email).await?;

        let password_hash = hash_password(&input.password)?;
        let user = User::new(email, username, password_hash);

        match with_timeout(self.query_timeout, self.users.create(&user)).await {
            Ok(created) => {
                tracing::info!("User registered: {} (id {})", created.username, created.id);
                Ok(created)
            }
            // Lost a race with another registration after the availability check
            Err(ServiceError::Internal(err)) if is_unique_violation(&err) => Err(
                ServiceError::DuplicateIdentity("email or username".to_string()),
            ),
            Err(err) => Err(err),
        }
    }

    async fn check_available(&self, username: &str, email: &str) -> Result<(), ServiceError> {
        match self.uniqueness {
            UniquenessPolicy::PerField => {
                if with_timeout(self.query_timeout, self.users.get_by_email(email))
                    .await?
                    .is_some()
                {
                    return Err(ServiceError::DuplicateIdentity("email".to_string()));
                }
                if with_timeout(self.query_timeout, self.users.get_by_username(username))
                    .await?
                    .is_some()
                {
                    return Err(ServiceError::DuplicateIdentity("username".to_string()));
                }
            }
            UniquenessPolicy::SharedNamespace => {
                if with_timeout(self.query_timeout, self.users.identity_taken(email)).await? {
                    return Err(ServiceError::DuplicateIdentity("email".to_string()));
                }
                if with_timeout(self.query_timeout, self.users.identity_taken(username)).await? {
                    return Err(ServiceError::DuplicateIdentity("username".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Log in with a username or email and start a fresh session.
    ///
    /// The identifier may name one user by username and another by email;
    /// the password is checked against both, username first. An unknown
    /// identifier and a wrong password fail the same way.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), ServiceError> {
        let identifier = input.identifier.trim();

        let mut candidates = Vec::with_capacity(2);
        if let Some(user) =
            with_timeout(self.query_timeout, self.users.get_by_username(identifier)).await?
        {
            candidates.push(user);
        }
        if let Some(user) =
            with_timeout(self.query_timeout, self.users.get_by_email(identifier)).await?
        {
            if candidates.iter().all(|c| c.id != user.id) {
                candidates.push(user);
            }
        }

        if candidates.is_empty() {
            verify_dummy(&input.password);
        }

        let mut matched = None;
        for candidate in candidates {
            if verify_password(&input.password, &candidate.password_hash)? {
                matched = Some(candidate);
                break;
            }
        }

        let Some(user) = matched else {
            tracing::warn!("Login rejected");
            return Err(ServiceError::InvalidCredentials);
        };

        let session = self.sessions.create_session(user.id).await?;
        tracing::info!("User logged in: {}", user.username);
        Ok((user, session))
    }

    /// End a session. Unknown tokens are fine.
    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        self.sessions.revoke(token).await
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>, ServiceError> {
        with_timeout(self.query_timeout, self.users.get_by_id(id)).await
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), ServiceError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ServiceError::Validation(format!(
            "Username must be {} to {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ServiceError::Validation(
            "Username may only contain letters, digits and _ . @ -".to_string(),
        ));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(ServiceError::Validation("Email address is invalid".to_string()));
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    Ok(())
}
