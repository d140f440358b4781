use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

const DEFAULT_DISALLOWED: &str = "!@#$%^&*()_+={}[]:;\"'<>,.?/\\|";

/// Rules applied to new passwords before they are hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub disallowed: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 13,
            disallowed: DEFAULT_DISALLOWED.to_string(),
        }
    }
}

impl PasswordPolicy {
    /// One message per broken rule; empty when the password is acceptable.
    pub fn violations(&self, password: &str) -> Vec<String> {
        let mut messages = Vec::new();
        let length = password.chars().count();

        if length < self.min_length || length > self.max_length {
            messages.push(format!(
                "your password must be between {} and {} characters long",
                self.min_length, self.max_length
            ));
        }

        if password.chars().any(|c| self.disallowed.contains(c)) {
            messages.push("your password must not contain characters that are not allowed".into());
        }

        let has_upper = password.chars().any(char::is_uppercase);
        let has_lower = password.chars().any(char::is_lowercase);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !(has_upper && has_lower && has_digit) {
            messages.push(
                "your password must include at least one uppercase letter, one lowercase letter, and one digit"
                    .into(),
            );
        }

        messages
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
}

pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// Never matches: the digest is all zero bytes. It is encoded with the default
/// argon2 parameters so checking against it costs as much as a real verification.
pub(crate) const UNKNOWN_ACCOUNT_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// False for a wrong password and for a malformed stored hash alike.
pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    verify_account_password(plain, Some(stored_hash))
}

/// Verification for a login attempt whose account may not exist. A missing account or
/// an unusable stored hash still runs a full argon2 verification before failing.
pub fn verify_account_password(plain: &str, stored_hash: Option<&str>) -> bool {
    match hash_to_check(stored_hash) {
        Some((parsed, genuine)) => {
            let matched = Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok();
            genuine && matched
        }
        None => false,
    }
}

/// The stored hash when it parses, otherwise the unknown-account stand-in. The flag
/// says whether a successful verification may count.
fn hash_to_check(stored_hash: Option<&str>) -> Option<(PasswordHash<'_>, bool)> {
    if let Some(parsed) = stored_hash.and_then(|hash| PasswordHash::new(hash).ok()) {
        return Some((parsed, true));
    }
    PasswordHash::new(UNKNOWN_ACCOUNT_HASH)
        .ok()
        .map(|parsed| (parsed, false))
}
