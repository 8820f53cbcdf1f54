//! Credential hashing port

use anyhow::Result;

/// Turns raw passwords into stored credentials and checks them.
///
/// Implementations must be salted and deliberately slow. Both methods are
/// CPU-bound and are called from the blocking thread pool.
pub trait CredentialHasher: Send + Sync {
    /// Produce the stored form of `raw_password`.
    fn hash(&self, raw_password: &str) -> Result<String>;

    /// Check `raw_password` against a stored credential produced by [`hash`](Self::hash).
    /// A malformed stored credential is an error, a wrong password is `Ok(false)`.
    fn verify(&self, raw_password: &str, credential: &str) -> Result<bool>;
}
