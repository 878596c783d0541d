/// Input validators for the registration and login flows
///
/// Every check reports the offending field so clients can correct their
/// input. Length limits double as DoS protection for the password hasher
/// and the credential store key space.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_LOCAL_PART_LENGTH: usize = 64;

pub const MIN_PASSWORD_LENGTH: usize = 8;
// bcrypt only reads the first 72 bytes; anything much longer is a DoS vector
pub const MAX_PASSWORD_LENGTH: usize = 128;

const MAX_DEVICE_ID_LENGTH: usize = 128;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Validates an email address and returns its normalized (trimmed,
/// lowercased) form, which is what the user store indexes on.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email", MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email"));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates password length policy.
///
/// No composition rules; length is the only policy.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length == 0 {
        return Err(ValidationError::EmptyField("password"));
    }

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    Ok(())
}

/// Validates a client-supplied device identifier.
///
/// The device id is an opaque session partition key. It only has to be
/// non-empty, bounded, and printable.
pub fn is_valid_device_id(device_id: &str) -> Result<String, ValidationError> {
    let trimmed = device_id.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("deviceId"));
    }

    if trimmed.chars().count() > MAX_DEVICE_ID_LENGTH {
        return Err(ValidationError::TooLong("deviceId", MAX_DEVICE_ID_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("deviceId"));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if email.matches('@').count() != 1 {
        return true;
    }

    if let Some(at_pos) = email.find('@') {
        if at_pos > MAX_LOCAL_PART_LENGTH {
            return true;
        }
    }

    email.contains('\0')
}
