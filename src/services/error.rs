//! Service error type
//!
//! Every service operation returns `ServiceError`. Repositories report
//! `anyhow::Error`; the conversion below inspects the chain for a
//! `sqlx::Error` to tell transient store trouble from real faults.

use std::future::Future;
use std::time::Duration;

use crate::db::memory::UniqueViolation;

/// Error types for service operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Unknown identifier or wrong password. Deliberately uninformative.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The operation needs a live session
    #[error("Please sign in to continue.")]
    AuthenticationRequired,

    /// Reaction target type or id is not acceptable
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Reaction value is not +1 or -1
    #[error("Invalid reaction value: {0}")]
    InvalidValue(i64),

    /// Email or username already in use
    #[error("Already in use: {0}")]
    DuplicateIdentity(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store timed out, was busy, or the pool is unavailable
    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl ServiceError {
    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        let transient = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
            .is_some_and(is_transient_sqlx_error);

        if transient {
            Self::Transient(format!("{:#}", err))
        } else {
            Self::Internal(err)
        }
    }
}

/// SQLite primary result codes for a busy or locked database
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_transient_sqlx_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

/// True if the chain carries a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<UniqueViolation>()
            || cause
                .downcast_ref::<sqlx::Error>()
                .and_then(|e| e.as_database_error())
                .is_some_and(|db| db.is_unique_violation())
    })
}

/// Run a store call with a deadline. Elapsed deadlines become `Transient`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => Err(ServiceError::Transient(format!(
            "store did not answer within {} ms",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = Err::<(), _>(sqlx::Error::PoolTimedOut)
            .context("Failed to get session by ID")
            .unwrap_err();
        let service_err = ServiceError::from(err);
        assert!(matches!(service_err, ServiceError::Transient(_)));
        assert!(service_err.is_retryable());
    }

    #[test]
    fn test_unique_violation_from_memory_store() {
        let err = Err::<(), _>(UniqueViolation("users"))
            .context("Failed to create user")
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&anyhow::anyhow!("UNIQUE constraint failed: users")));
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = anyhow::anyhow!("something broke");
        let service_err = ServiceError::from(err);
        assert!(matches!(service_err, ServiceError::Internal(_)));
        assert!(!service_err.is_retryable());

        let err = Err::<(), _>(sqlx::Error::RowNotFound)
            .context("lookup")
            .unwrap_err();
        assert!(matches!(ServiceError::from(err), ServiceError::Internal(_)));
    }

    #[test]
    fn test_auth_required_message() {
        assert_eq!(
            ServiceError::AuthenticationRequired.to_string(),
            "Please sign in to continue."
        );
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed() {
        let result: Result<(), ServiceError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Transient(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_value() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
