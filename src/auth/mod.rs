/// Authentication module
///
/// Token minting, verification and rotation, password hashing, and the
/// account flows built on top of them.

mod accounts;
mod claims;
mod jwt;
mod password;
mod refresh_token;
mod tokens;

pub use accounts::AccountService;
pub use claims::{AccessClaims, RefreshClaims};
pub use jwt::AccessVerifier;
pub use password::{hash_password, verify_password};
pub use refresh_token::hash_token;
pub use tokens::{CredentialPair, TokenService};
