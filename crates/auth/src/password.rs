//! Adaptive, salted password hashing (Argon2id).
//!
//! Hashing is CPU-bound, so the async entry points move the work onto
//! tokio's blocking pool; concurrent logins never serialize on the I/O threads.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashingError {
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("hashing failed: {0}")]
    Hash(String),

    #[error("hashing worker failed: {0}")]
    Worker(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingParams {
    /// Minimum legal cost. Only for tests and benches.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST.max(8),
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies secrets with one fixed set of Argon2id parameters.
///
/// Cheap to clone; shared by password handling and refresh-token fingerprints.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(params: HashingParams) -> Result<Self, HashingError> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| HashingError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `secret` with a fresh random salt. Blocking; returns a PHC string.
    pub fn hash_blocking(&self, secret: &[u8]) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        self.argon2()
            .hash_password(secret, &salt)
            .map(|h| h.to_string())
            .map_err(|e| HashingError::Hash(e.to_string()))
    }

    /// Check `secret` against a PHC string. Blocking.
    ///
    /// A malformed stored hash counts as a mismatch. The parameters embedded in
    /// the stored hash win over this hasher's, so old hashes keep verifying
    /// after a cost change.
    pub fn verify_blocking(&self, secret: &[u8], stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self.argon2().verify_password(secret, &parsed).is_ok(),
            Err(_) => false,
        }
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, HashingError> {
        let hasher = self.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(password.as_bytes()))
            .await
            .map_err(|e| HashingError::Worker(e.to_string()))?
    }

    pub async fn verify_password(&self, password: &str, stored: &str) -> Result<bool, HashingError> {
        let hasher = self.clone();
        let password = password.to_owned();
        let stored = stored.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify_blocking(password.as_bytes(), &stored))
            .await
            .map_err(|e| HashingError::Worker(e.to_string()))
    }
}
