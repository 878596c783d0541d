/// JWT signing and stateless verification
///
/// Signature and issuer are checked by `jsonwebtoken`. Expiry is checked
/// against the injected clock so tests can control time.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{check_expiry, AccessClaims};
use crate::clock::Clock;
use crate::error::{AuthError, TokenRejection};

/// Sign claims with HS256
pub(crate) fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Internal(format!("Token generation failed: {}", e)))
}

fn validation(issuer: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);
    // Expiry goes through the clock instead
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;
    validation
}

/// Verify the signature and issuer, then decode the claims
pub(crate) fn decode_verified<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    issuer: &str,
) -> Result<T, TokenRejection> {
    decode::<T>(token, key, &validation(issuer))
        .map(|data| data.claims)
        .map_err(|e| {
            let rejection = classify(e.kind());
            tracing::debug!(error = %e, reason = %rejection, "JWT validation error");
            rejection
        })
}

fn classify(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidIssuer | ErrorKind::InvalidAlgorithm => {
            TokenRejection::BadSignature
        }
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        _ => TokenRejection::Malformed,
    }
}

/// Stateless access-token verifier.
///
/// Holds nothing but the access decoding key, the issuer and a clock, so it
/// can run on every request without touching any store.
#[derive(Clone)]
pub struct AccessVerifier {
    decoding_key: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl AccessVerifier {
    pub fn new(secret: &str, issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            clock,
        }
    }

    /// Check signature and expiry, returning the verified claims
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenRejection> {
        let claims: AccessClaims = decode_verified(token, &self.decoding_key, &self.issuer)?;
        check_expiry(claims.exp, self.clock.now())?;
        Ok(claims)
    }

    /// Check signature and expiry, returning the user id
    pub fn verify_user(&self, token: &str) -> Result<Uuid, TokenRejection> {
        self.verify(token)?.user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &str = "test-access-secret-at-least-32-characters";

    fn signed(claims: &AccessClaims, secret: &str) -> String {
        sign(claims, &EncodingKey::from_secret(secret.as_bytes())).expect("Failed to sign")
    }

    fn setup() -> (Arc<ManualClock>, AccessVerifier) {
        let clock = Arc::new(ManualClock::new(10_000));
        let verifier = AccessVerifier::new(SECRET, "test", clock.clone());
        (clock, verifier)
    }

    #[test]
    fn test_generate_and_validate_token() {
        let (_, verifier) = setup();
        let user_id = Uuid::new_v4();
        let token = signed(&AccessClaims::new(user_id, 10_000, 900, "test".to_string()), SECRET);

        assert_eq!(verifier.verify_user(&token).unwrap(), user_id);
    }

    #[test]
    fn test_invalid_token() {
        let (_, verifier) = setup();
        assert_eq!(
            verifier.verify("invalid.token.here").unwrap_err(),
            TokenRejection::Malformed
        );
        assert_eq!(verifier.verify("").unwrap_err(), TokenRejection::Malformed);
    }

    #[test]
    fn test_tampered_token() {
        let (_, verifier) = setup();
        let claims = AccessClaims::new(Uuid::new_v4(), 10_000, 900, "test".to_string());
        let token = signed(&claims, SECRET);

        // Swap the payload for one claiming a different user
        let mut forged = claims.clone();
        forged.sub = Uuid::new_v4().to_string();
        let forged_token = signed(&forged, "attacker-secret");
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged_token.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert_eq!(verifier.verify(&spliced).unwrap_err(), TokenRejection::BadSignature);
    }

    #[test]
    fn test_wrong_secret() {
        let (_, verifier) = setup();
        let token = signed(
            &AccessClaims::new(Uuid::new_v4(), 10_000, 900, "test".to_string()),
            "some-other-secret",
        );

        assert_eq!(verifier.verify(&token).unwrap_err(), TokenRejection::BadSignature);
    }

    #[test]
    fn test_wrong_issuer() {
        let (_, verifier) = setup();
        let token = signed(
            &AccessClaims::new(Uuid::new_v4(), 10_000, 900, "wrong-issuer".to_string()),
            SECRET,
        );

        assert_eq!(verifier.verify(&token).unwrap_err(), TokenRejection::BadSignature);
    }

    #[test]
    fn test_expiry_follows_clock() {
        let (clock, verifier) = setup();
        let token = signed(&AccessClaims::new(Uuid::new_v4(), 10_000, 900, "test".to_string()), SECRET);

        clock.set(10_899);
        assert!(verifier.verify(&token).is_ok());

        clock.set(10_901);
        assert_eq!(verifier.verify(&token).unwrap_err(), TokenRejection::Expired);
    }

    #[test]
    fn test_non_uuid_subject_is_malformed() {
        let (_, verifier) = setup();
        let mut claims = AccessClaims::new(Uuid::new_v4(), 10_000, 900, "test".to_string());
        claims.sub = "admin".to_string();
        let token = signed(&claims, SECRET);

        assert!(verifier.verify(&token).is_ok());
        assert_eq!(verifier.verify_user(&token).unwrap_err(), TokenRejection::Malformed);
    }
}
