/// Password Hashing and Verification
///
/// bcrypt with a configurable cost factor. Both operations are CPU-bound by
/// design (the default cost of 12 takes a few hundred milliseconds), so they
/// run on the blocking thread pool instead of an async worker.

use bcrypt::{hash, verify};

use crate::error::AuthError;

/// Hash a password using bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    hash(password, cost).map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    verify(password, hash)
        .map_err(|e| AuthError::Internal(format!("Password verification failed: {}", e)))
}

pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))?
}
