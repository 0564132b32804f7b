//! Initial credentials for created accounts.
//!
//! Accounts are created with a random password nobody knows; users sign in
//! through the identity provider or reset it. Only the Argon2id hash is
//! stored.

use argon2::password_hash::rand_core::OsRng as SaltRng;
use argon2::password_hash::{PasswordHasher as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::processor::{ProcessorError, ProcessorResult};

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LENGTH: usize = 32;

/// Generates and hashes random initial passwords.
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    params: Params,
    length: usize,
}

impl Default for CredentialGenerator {
    /// Argon2id with m=19456 KiB, t=2, p=1.
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
            length: GENERATED_PASSWORD_LENGTH,
        }
    }
}

impl CredentialGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator with custom Argon2 cost parameters.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> ProcessorResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| ProcessorError::Credential(format!("invalid Argon2 parameters: {e}")))?;
        Ok(Self {
            params,
            length: GENERATED_PASSWORD_LENGTH,
        })
    }

    /// Random alphanumeric password from the OS CSPRNG.
    #[must_use]
    pub fn generate_password(&self) -> String {
        (0..self.length)
            .map(|_| OsRng.sample(Alphanumeric) as char)
            .collect()
    }

    /// Argon2id PHC string for `password`.
    pub fn hash(&self, password: &str) -> ProcessorResult<String> {
        let salt = SaltString::generate(&mut SaltRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ProcessorError::Credential(format!("hashing failed: {e}")))
    }

    /// Hash of a fresh random password; the password itself is discarded.
    pub fn generate_hash(&self) -> ProcessorResult<String> {
        self.hash(&self.generate_password())
    }
}
