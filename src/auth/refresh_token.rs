/// Refresh token helpers
///
/// Refresh tokens are signed JWTs returned to the client. The credential
/// store only ever sees their SHA-256 digest, so a dump of the store cannot
/// be replayed.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

const NONCE_LENGTH: usize = 32;

/// Random alphanumeric nonce embedded in each refresh token
pub fn generate_nonce() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256 (hex encoded)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();

        assert_eq!(nonce.len(), NONCE_LENGTH);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn test_token_hashing() {
        let hash1 = hash_token("token");
        let hash2 = hash_token("token");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, "token");
        // SHA-256 hex
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, hash_token("token2"));
    }
}
