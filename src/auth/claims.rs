/// JWT Claims structures
///
/// Access claims are the whole session identity: subject, issue time and
/// expiry, bound together by the signature. Refresh claims additionally bind
/// the device the session belongs to and carry a random nonce so that two
/// refresh tokens minted in the same second never collide.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenRejection;

/// Claims carried by access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

impl AccessClaims {
    pub fn new(user_id: Uuid, issued_at: i64, expiry_seconds: i64, issuer: String) -> Self {
        Self {
            sub: user_id.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(expiry_seconds),
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, TokenRejection> {
        parse_subject(&self.sub)
    }
}

/// Claims carried by refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    /// Device the session is bound to
    pub did: String,
    /// Random nonce
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl RefreshClaims {
    pub fn new(
        user_id: Uuid,
        device_id: String,
        nonce: String,
        issued_at: i64,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            did: device_id,
            jti: nonce,
            iat: issued_at,
            exp: issued_at.saturating_add(expiry_seconds),
            iss: issuer,
        }
    }

    pub fn user_id(&self) -> Result<Uuid, TokenRejection> {
        parse_subject(&self.sub)
    }
}

fn parse_subject(sub: &str) -> Result<Uuid, TokenRejection> {
    Uuid::parse_str(sub).map_err(|_| TokenRejection::Malformed)
}

/// Reject when `now` has reached the expiry instant
pub fn check_expiry(exp: i64, now: i64) -> Result<(), TokenRejection> {
    if now >= exp {
        Err(TokenRejection::Expired)
    } else {
        Ok(())
    }
}
