use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, PasswordHash,
};
use tracing::warn;

use crate::error::{DomainError, DomainResult};

/// Argon2 hash of an unguessable password, verified for usernames that do
/// not match the configured one so both failure paths cost exactly one
/// verification. Keeps "unknown user" and "wrong password" externally
/// indistinguishable within the variance of a single Argon2 run.
const DECOY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$VE0e3g7DalWHgDwou3nuRA$uC6TER156UQpk0lNQ5+jHM0l5poVjPA1he8TZbuUjbo";

/// Validates a caller's credential against the configured password hash
/// before any query is served.
pub struct AccessGate {
    username: String,
    password_hash: String,
}

impl AccessGate {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            username,
            password_hash,
        }
    }

    /// Verify the supplied credentials. Failure is a boolean, never an
    /// error, and carries no detail about which part was wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let known_user = username == self.username;
        let hash = if known_user {
            self.password_hash.as_str()
        } else {
            DECOY_HASH
        };

        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A malformed configured hash still burns one verification
                // so the failure is not observable from outside.
                warn!(error = %e, "Configured password hash is not a valid PHC string");
                match PasswordHash::new(DECOY_HASH) {
                    Ok(decoy) => {
                        let _ = Argon2::default().verify_password(password.as_bytes(), &decoy);
                        return false;
                    }
                    Err(_) => return false,
                }
            }
        };

        let verified = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();

        known_user && verified
    }

    /// Hash a password for configuration, using a fresh random salt.
    pub fn hash_password(password: &str) -> DomainResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DomainError::Internal(anyhow::anyhow!("Password hashing failed: {e}")))
    }
}
