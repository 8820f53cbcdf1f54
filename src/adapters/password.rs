//! Argon2id credential hashing

use anyhow::{Result, anyhow};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::HashingConfig;
use crate::ports::CredentialHasher;

/// Stores credentials as PHC strings (`$argon2id$v=19$m=...$salt$hash`).
///
/// Verification reads the cost parameters back out of the stored string, so
/// raising the configured cost does not invalidate existing credentials.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new(config: HashingConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow!("Invalid argon2 parameters: {:?}", e))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, raw_password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(raw_password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {:?}", e))?;
        Ok(hash.to_string())
    }

    fn verify(&self, raw_password: &str, credential: &str) -> Result<bool> {
        let parsed = PasswordHash::new(credential)
            .map_err(|e| anyhow!("Stored credential is not a valid PHC string: {:?}", e))?;

        match self.argon2.verify_password(raw_password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("Failed to verify password: {:?}", e)),
        }
    }
}
