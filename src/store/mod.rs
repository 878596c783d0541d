/// Storage collaborators
///
/// The user store owns identities and password hashes. The credential store
/// owns per-(user, device) refresh-token state. Both are traits so the
/// service can run against PostgreSQL in production and in-memory maps in
/// tests and local development.

mod memory;
mod postgres;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AuthError, StoreError};

pub use memory::{InMemoryCredentialStore, InMemoryUserStore};
pub use postgres::{PgCredentialStore, PgUserStore};

/// Stored user identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

/// Composite credential store key for one (user, device) session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: Uuid,
    pub device_id: String,
}

impl SessionKey {
    pub fn new(user_id: Uuid, device_id: impl Into<String>) -> Self {
        Self {
            user_id,
            device_id: device_id.into(),
        }
    }
}

// A UUID never contains ':' so the device id may contain anything.
impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refresh:{}:{}", self.user_id, self.device_id)
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Create a user, failing with `StoreError::Conflict` if the email exists
    async fn create(&self, email: &str, password_hash: &str) -> Result<Uuid, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create or overwrite the entry for `key`
    async fn put(&self, key: &SessionKey, value: &str, ttl_seconds: i64) -> Result<(), StoreError>;

    /// Atomically replace the entry only if it currently holds `expected`.
    ///
    /// Returns `false` when the entry is missing, expired, or different.
    async fn compare_and_put(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl_seconds: i64,
    ) -> Result<bool, StoreError>;

    /// Current live value, if any
    async fn get(&self, key: &SessionKey) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}

/// Run a store call with a caller-enforced deadline.
///
/// An elapsed deadline is a transient `Unavailable` failure.
pub async fn with_timeout<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AuthError::from),
        Err(_) => {
            tracing::error!(
                operation = operation,
                timeout_ms = limit.as_millis() as u64,
                "Storage call timed out"
            );
            Err(AuthError::Unavailable(format!("{} timed out", operation)))
        }
    }
}
