use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

/// HashError
///
/// Raised only when a hash cannot be produced (entropy source or parameter
/// failure). Verification never errors; a mismatch or unparsable hash is `false`.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("salt generation failed: {0}")]
    Salt(String),
    #[error("hashing failed: {0}")]
    Hash(String),
}

/// Hashes `plaintext` with Argon2 and a fresh random salt, returning the PHC
/// string. Two calls on the same input produce different outputs; compare with
/// [`verify_password`], never with `==`.
pub fn hash_password(plaintext: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| HashError::Salt(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::Salt(e.to_string()))?;

    let phc = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| HashError::Hash(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Checks `plaintext` against a stored PHC hash. Malformed hashes verify as `false`.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Runs hashing on the blocking pool so a request task never stalls the runtime.
pub async fn hash_password_blocking(plaintext: String) -> Result<String, HashError> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext))
        .await
        .map_err(|e| HashError::Hash(e.to_string()))?
}

/// Blocking-pool counterpart of [`verify_password`]. A panicked worker counts as a mismatch.
pub async fn verify_password_blocking(plaintext: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&plaintext, &hash))
        .await
        .unwrap_or(false)
}
