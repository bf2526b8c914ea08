//! Password hashing and verification using bcrypt.
//!
//! Both operations are CPU-bound and run on the blocking pool so they never
//! stall the async workers.

use anyhow::Context;

use crate::errors::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores input past 72 bytes; refuse longer passwords instead of truncating silently.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a password with a random salt at the given cost.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("password hashing failed")?;
    Ok(hash)
}

/// Verify a password against a stored bcrypt hash. Malformed hashes never verify.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_string();
    let hash = hash.to_string();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password verification task failed")?;
    Ok(verified.unwrap_or(false))
}
