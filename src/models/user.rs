//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// Email and username are each unique. The password is only ever stored
/// as an Argon2 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Username (unique)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been stored yet.
    ///
    /// The password must already be hashed, see `services::password::hash_password()`.
    pub fn new(email: String, username: String, password_hash: String) -> Self {
        Self {
            id: 0, // Will be set by the database
            email,
            username,
            password_hash,
            created_at: Utc::now(),
        }
    }
}
