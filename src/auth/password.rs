use pbkdf2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Pbkdf2,
};

use super::AuthError;

pub const DEFAULT_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const OUTPUT_LEN: usize = 32;

/// Salted PBKDF2-HMAC-SHA256, stored as a PHC string
/// (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`).
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasherConfig {
    pub rounds: u32,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self { rounds: DEFAULT_ROUNDS }
    }
}

impl PasswordHasherConfig {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt_bytes: [u8; SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::PasswordHash(e.to_string()))?;

        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_LEN,
        };

        let hash = Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Constant-time check of `password` against a stored hash. The rounds
    /// recorded in the hash are used, not the configured ones.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                log::warn!("Stored password hash is malformed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasherConfig {
        PasswordHasherConfig::new(1_000)
    }

    #[test]
    fn test_hash_verifies_only_original_password() {
        let stored = hasher().hash("correct horse").unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$i=1000,l=32$"));
        assert!(hasher().verify("correct horse", &stored));
        assert!(!hasher().verify("battery staple", &stored));
    }

    #[test]
    fn test_salts_differ() {
        let first = hasher().hash("same").unwrap();
        let second = hasher().hash("same").unwrap();
        assert_ne!(first, second);
        assert!(hasher().verify("same", &first));
        assert!(hasher().verify("same", &second));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!hasher().verify("anything", "not-a-hash"));
        assert!(!hasher().verify("anything", ""));
    }

    #[test]
    fn test_verification_uses_stored_rounds() {
        let stored = PasswordHasherConfig::new(2_000).hash("pw").unwrap();
        assert!(PasswordHasherConfig::new(5).verify("pw", &stored));
    }
}
