//! PostgreSQL store backends.
//!
//! Refresh tokens are stored as SHA-256 digests (the caller hashes them), one
//! row per (user, device) session. Rotation relies on a single conditional
//! `UPDATE`, which Postgres executes atomically per row.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, SessionKey, User, UserStore};
use crate::configuration::MAX_TOKEN_EXPIRY_SECONDS;
use crate::error::StoreError;

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, password_hash)| User {
            id,
            email,
            password_hash,
        }))
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<Uuid, StoreError> {
        let user_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(user_id)
    }
}

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop rows whose TTL has passed
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn expiry(ttl_seconds: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(ttl_seconds.clamp(0, MAX_TOKEN_EXPIRY_SECONDS))
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn put(&self, key: &SessionKey, value: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (session_key, user_id, device_id, token_hash, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_key)
            DO UPDATE SET token_hash = EXCLUDED.token_hash,
                          expires_at = EXCLUDED.expires_at,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key.to_string())
        .bind(key.user_id)
        .bind(&key.device_id)
        .bind(value)
        .bind(expiry(ttl_seconds))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn compare_and_put(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl_seconds: i64,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET token_hash = $3, expires_at = $4, updated_at = $5
            WHERE session_key = $1 AND token_hash = $2 AND expires_at > $5
            "#,
        )
        .bind(key.to_string())
        .bind(expected)
        .bind(new_value)
        .bind(expiry(ttl_seconds))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT token_hash FROM refresh_sessions WHERE session_key = $1 AND expires_at > $2",
        )
        .bind(key.to_string())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE session_key = $1")
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_clamped() {
        let now = Utc::now();

        assert!(expiry(60) > now);
        assert!(expiry(i64::MAX) <= now + Duration::seconds(MAX_TOKEN_EXPIRY_SECONDS + 5));
        assert!(expiry(-30) <= Utc::now());
    }
}
