/// Registration, login and logout flows.
///
/// These produce credential pairs through the Token Service. Login failures
/// are undifferentiated: an unknown email and a wrong password
/// yield the same error after the same amount of bcrypt work.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::password::{hash_password, hash_password_blocking, verify_password_blocking};
use crate::auth::tokens::{CredentialPair, TokenService};
use crate::error::AuthError;
use crate::store::{with_timeout, UserStore};
use crate::validators::{is_valid_device_id, is_valid_email, is_valid_password};

pub struct AccountService {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    hash_cost: u32,
    store_timeout: Duration,
    // Verified against when the email is unknown, to equalize timing
    dummy_hash: String,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenService>,
        hash_cost: u32,
        store_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hash_password("authgate-timing-equalizer", hash_cost)?;

        Ok(Self {
            users,
            tokens,
            hash_cost,
            store_timeout,
            dummy_hash,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        device_id: &str,
    ) -> Result<CredentialPair, AuthError> {
        let email = is_valid_email(email)?;
        is_valid_password(password)?;
        let device_id = is_valid_device_id(device_id)?;

        let password_hash = hash_password_blocking(password.to_string(), self.hash_cost).await?;

        let user_id = with_timeout(
            self.store_timeout,
            "user_store.create",
            self.users.create(&email, &password_hash),
        )
        .await?;

        let pair = self.tokens.mint(user_id, &device_id).await?;

        tracing::info!(user_id = %user_id, device_id = %device_id, "User registered successfully");
        Ok(pair)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_id: &str,
    ) -> Result<CredentialPair, AuthError> {
        let device_id = is_valid_device_id(device_id)?;
        let email = email.trim().to_lowercase();

        let user = with_timeout(
            self.store_timeout,
            "user_store.find_by_email",
            self.users.find_by_email(&email),
        )
        .await?;

        let (user_id, hash) = match user {
            Some(user) => (Some(user.id), user.password_hash),
            None => (None, self.dummy_hash.clone()),
        };

        let password_valid = verify_password_blocking(password.to_string(), hash).await?;

        let user_id = match (user_id, password_valid) {
            (Some(user_id), true) => user_id,
            _ => return Err(AuthError::InvalidCredentials),
        };

        // Supersedes any previous refresh token for this device
        let pair = self.tokens.mint(user_id, &device_id).await?;

        tracing::info!(user_id = %user_id, device_id = %device_id, "User logged in successfully");
        Ok(pair)
    }

    pub async fn refresh(&self, refresh_token: &str, device_id: &str) -> Result<CredentialPair, AuthError> {
        let device_id = is_valid_device_id(device_id)?;
        self.tokens.rotate(refresh_token, &device_id).await
    }

    pub async fn logout(&self, user_id: Uuid, device_id: &str) -> Result<(), AuthError> {
        let device_id = is_valid_device_id(device_id)?;
        self.tokens.revoke(user_id, &device_id).await
    }
}
