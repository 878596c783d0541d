/// Token Service
///
/// Owns the credential lifecycle:
/// - `mint` issues an access/refresh pair and records the refresh token for
///   the (user, device) session, superseding whatever was there.
/// - `verify_access` is a pure signature + expiry check.
/// - `rotate` exchanges a refresh token for a new pair exactly once. The old
///   token is swapped out with a single compare-and-put, so two concurrent
///   rotations of the same token cannot both succeed. Losing the swap means
///   the token was already used; the session is then revoked.
/// - `revoke` deletes the session unconditionally.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey};
use uuid::Uuid;

use crate::auth::claims::{check_expiry, AccessClaims, RefreshClaims};
use crate::auth::jwt::{decode_verified, sign, AccessVerifier};
use crate::auth::refresh_token::{generate_nonce, hash_token};
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AuthError, TokenRejection};
use crate::store::{with_timeout, CredentialStore, SessionKey};

/// Freshly issued credentials for one (user, device) session
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
    pub device_id: String,
    pub issued_at: i64,
    pub access_expiry: i64,
    pub refresh_expiry: i64,
}

impl CredentialPair {
    /// Access token lifetime in seconds
    pub fn expires_in(&self) -> i64 {
        self.access_expiry - self.issued_at
    }
}

pub struct TokenService {
    access_key: EncodingKey,
    refresh_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    verifier: AccessVerifier,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl TokenService {
    pub fn new(
        settings: &JwtSettings,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            access_key: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            refresh_key: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            verifier: AccessVerifier::new(&settings.access_secret, settings.issuer.clone(), clock.clone()),
            issuer: settings.issuer.clone(),
            access_ttl: settings.access_token_expiry,
            refresh_ttl: settings.refresh_token_expiry,
            store,
            clock,
            store_timeout,
        }
    }

    /// The stateless verifier sharing this service's access key
    pub fn verifier(&self) -> &AccessVerifier {
        &self.verifier
    }

    /// Issue a new pair and make its refresh token the only valid one for
    /// the (user, device) session.
    pub async fn mint(&self, user_id: Uuid, device_id: &str) -> Result<CredentialPair, AuthError> {
        let pair = self.issue(user_id, device_id)?;
        let key = SessionKey::new(user_id, device_id);

        with_timeout(
            self.store_timeout,
            "credential_store.put",
            self.store.put(&key, &hash_token(&pair.refresh_token), self.refresh_ttl),
        )
        .await?;

        tracing::debug!(user_id = %user_id, device_id = %device_id, "Credential pair minted");
        Ok(pair)
    }

    /// Stateless access-token check. Never touches the credential store.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, TokenRejection> {
        self.verifier.verify_user(token)
    }

    /// Exchange a refresh token for a brand-new pair (rotation-on-use)
    pub async fn rotate(&self, refresh_token: &str, device_id: &str) -> Result<CredentialPair, AuthError> {
        let claims: RefreshClaims =
            decode_verified(refresh_token, &self.refresh_decoding_key, &self.issuer)?;
        check_expiry(claims.exp, self.clock.now())?;
        let user_id = claims.user_id()?;

        // The token itself says which session it belongs to; a different
        // device id must not be allowed to revoke someone else's session.
        if claims.did != device_id {
            tracing::warn!(
                user_id = %user_id,
                "Refresh token presented for a different device"
            );
            return Err(AuthError::Revoked);
        }

        let key = SessionKey::new(user_id, device_id);
        let pair = self.issue(user_id, device_id)?;

        let swapped = with_timeout(
            self.store_timeout,
            "credential_store.compare_and_put",
            self.store.compare_and_put(
                &key,
                &hash_token(refresh_token),
                &hash_token(&pair.refresh_token),
                self.refresh_ttl,
            ),
        )
        .await?;

        if swapped {
            tracing::info!(user_id = %user_id, device_id = %device_id, "Refresh token rotated");
            return Ok(pair);
        }

        // Superseded, revoked or expired server-side. Treat it as a
        // compromise signal and end the session for this device.
        tracing::warn!(
            user_id = %user_id,
            device_id = %device_id,
            "Refresh token reuse detected, revoking session"
        );
        self.revoke(user_id, device_id).await?;
        Err(AuthError::Revoked)
    }

    /// Delete the (user, device) session; later rotations fail with `Revoked`
    pub async fn revoke(&self, user_id: Uuid, device_id: &str) -> Result<(), AuthError> {
        let key = SessionKey::new(user_id, device_id);

        with_timeout(self.store_timeout, "credential_store.delete", self.store.delete(&key)).await?;

        tracing::info!(user_id = %user_id, device_id = %device_id, "Session revoked");
        Ok(())
    }

    fn issue(&self, user_id: Uuid, device_id: &str) -> Result<CredentialPair, AuthError> {
        let now = self.clock.now();

        let access_claims = AccessClaims::new(user_id, now, self.access_ttl, self.issuer.clone());
        let refresh_claims = RefreshClaims::new(
            user_id,
            device_id.to_string(),
            generate_nonce(),
            now,
            self.refresh_ttl,
            self.issuer.clone(),
        );

        Ok(CredentialPair {
            access_token: sign(&access_claims, &self.access_key)?,
            refresh_token: sign(&refresh_claims, &self.refresh_key)?,
            user_id,
            device_id: device_id.to_string(),
            issued_at: now,
            access_expiry: access_claims.exp,
            refresh_expiry: refresh_claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::store::InMemoryCredentialStore;
    use async_trait::async_trait;

    const START: i64 = 1_700_000_000;

    fn settings() -> JwtSettings {
        JwtSettings {
            access_secret: "test-access-secret-at-least-32-characters".to_string(),
            refresh_secret: "test-refresh-secret-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            issuer: "test".to_string(),
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryCredentialStore>,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(InMemoryCredentialStore::new(clock.clone()));
        let tokens = Arc::new(TokenService::new(
            &settings(),
            store.clone(),
            clock.clone(),
            Duration::from_millis(500),
        ));
        Fixture { clock, store, tokens }
    }

    #[tokio::test]
    async fn test_mint_then_verify_access() {
        let f = fixture();
        let user_id = Uuid::new_v4();

        let pair = f.tokens.mint(user_id, "dev1").await.unwrap();

        assert_eq!(f.tokens.verify_access(&pair.access_token).unwrap(), user_id);
        assert_eq!(pair.expires_in(), 900);
        assert_eq!(pair.refresh_expiry, START + 604_800);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[tokio::test]
    async fn test_store_holds_only_the_digest() {
        let f = fixture();
        let user_id = Uuid::new_v4();

        let pair = f.tokens.mint(user_id, "dev1").await.unwrap();
        let stored = f.store.get(&SessionKey::new(user_id, "dev1")).await.unwrap();

        assert_eq!(stored, Some(hash_token(&pair.refresh_token)));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let f = fixture();
        let pair = f.tokens.mint(Uuid::new_v4(), "dev1").await.unwrap();

        assert_eq!(
            f.tokens.verify_access(&pair.refresh_token).unwrap_err(),
            TokenRejection::BadSignature
        );
        assert!(matches!(
            f.tokens.rotate(&pair.access_token, "dev1").await,
            Err(AuthError::Token(TokenRejection::BadSignature))
        ));
    }

    #[tokio::test]
    async fn test_access_expiry_boundary() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let pair = f.tokens.mint(user_id, "dev1").await.unwrap();

        f.clock.set(START + 900 - 1);
        assert_eq!(f.tokens.verify_access(&pair.access_token).unwrap(), user_id);

        f.clock.set(START + 900 + 1);
        assert_eq!(
            f.tokens.verify_access(&pair.access_token).unwrap_err(),
            TokenRejection::Expired
        );
    }

    #[tokio::test]
    async fn test_rotate_issues_new_pair() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let first = f.tokens.mint(user_id, "dev1").await.unwrap();

        f.clock.advance(60);
        let second = f.tokens.rotate(&first.refresh_token, "dev1").await.unwrap();

        assert_eq!(second.user_id, user_id);
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(f.tokens.verify_access(&second.access_token).unwrap(), user_id);
        assert_eq!(
            f.store.get(&SessionKey::new(user_id, "dev1")).await.unwrap(),
            Some(hash_token(&second.refresh_token))
        );
    }

    #[tokio::test]
    async fn test_reuse_of_rotated_token_revokes_session() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let first = f.tokens.mint(user_id, "dev1").await.unwrap();
        let second = f.tokens.rotate(&first.refresh_token, "dev1").await.unwrap();

        assert!(matches!(
            f.tokens.rotate(&first.refresh_token, "dev1").await,
            Err(AuthError::Revoked)
        ));
        // The whole session is gone, including the legitimate successor
        assert!(matches!(
            f.tokens.rotate(&second.refresh_token, "dev1").await,
            Err(AuthError::Revoked)
        ));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_relogin_supersedes_previous_refresh_token() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let old = f.tokens.mint(user_id, "dev1").await.unwrap();
        let _new = f.tokens.mint(user_id, "dev1").await.unwrap();

        assert!(matches!(
            f.tokens.rotate(&old.refresh_token, "dev1").await,
            Err(AuthError::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_device_isolation() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let phone = f.tokens.mint(user_id, "phone").await.unwrap();
        let laptop = f.tokens.mint(user_id, "laptop").await.unwrap();

        f.tokens.revoke(user_id, "phone").await.unwrap();

        assert!(matches!(
            f.tokens.rotate(&phone.refresh_token, "phone").await,
            Err(AuthError::Revoked)
        ));
        assert!(f.tokens.rotate(&laptop.refresh_token, "laptop").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_device_is_rejected_without_side_effects() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let phone = f.tokens.mint(user_id, "phone").await.unwrap();
        let laptop = f.tokens.mint(user_id, "laptop").await.unwrap();

        assert!(matches!(
            f.tokens.rotate(&phone.refresh_token, "laptop").await,
            Err(AuthError::Revoked)
        ));
        assert!(f.tokens.rotate(&laptop.refresh_token, "laptop").await.is_ok());
        assert!(f.tokens.rotate(&phone.refresh_token, "phone").await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let f = fixture();
        let pair = f.tokens.mint(Uuid::new_v4(), "dev1").await.unwrap();

        f.clock.advance(604_800 + 1);

        assert!(matches!(
            f.tokens.rotate(&pair.refresh_token, "dev1").await,
            Err(AuthError::Token(TokenRejection::Expired))
        ));
    }

    #[tokio::test]
    async fn test_garbage_refresh_token() {
        let f = fixture();

        assert!(matches!(
            f.tokens.rotate("definitely-not-a-token", "dev1").await,
            Err(AuthError::Token(TokenRejection::Malformed))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_has_single_winner() {
        let f = fixture();
        let pair = f.tokens.mint(Uuid::new_v4(), "dev1").await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tokens = f.tokens.clone();
                let refresh_token = pair.refresh_token.clone();
                tokio::spawn(async move { tokens.rotate(&refresh_token, "dev1").await })
            })
            .collect();

        let mut successes = 0;
        let mut revoked = 0;
        for handle in handles {
            match handle.await.expect("rotation task panicked") {
                Ok(_) => successes += 1,
                Err(AuthError::Revoked) => revoked += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(revoked, 15);
    }

    struct StalledStore;

    #[async_trait]
    impl CredentialStore for StalledStore {
        async fn put(&self, _: &SessionKey, _: &str, _: i64) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn compare_and_put(&self, _: &SessionKey, _: &str, _: &str, _: i64) -> Result<bool, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(false)
        }

        async fn get(&self, _: &SessionKey) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn delete(&self, _: &SessionKey) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_timeout_is_unavailable_not_revoked() {
        let clock = Arc::new(ManualClock::new(START));
        let healthy = TokenService::new(
            &settings(),
            Arc::new(InMemoryCredentialStore::new(clock.clone())),
            clock.clone(),
            Duration::from_millis(50),
        );
        let stalled = TokenService::new(&settings(), Arc::new(StalledStore), clock, Duration::from_millis(50));

        let pair = healthy.mint(Uuid::new_v4(), "dev1").await.unwrap();

        assert!(matches!(
            stalled.mint(Uuid::new_v4(), "dev1").await,
            Err(AuthError::Unavailable(_))
        ));
        assert!(matches!(
            stalled.rotate(&pair.refresh_token, "dev1").await,
            Err(AuthError::Unavailable(_))
        ));
        // Verification keeps working with the store down
        assert!(stalled.verify_access(&pair.access_token).is_ok());
    }
}
