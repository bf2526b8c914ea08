//! Authentication: password hashing, session and signed-token issuance, CSRF
//! protection, OAuth providers, and the request extractor that turns presented
//! credentials into a `Principal`.

pub mod cookies;
pub mod csrf;
pub mod extract;
pub mod handlers;
pub mod issuer;
pub mod oauth;
pub mod password;
pub mod session;
pub mod token;

use std::str::FromStr;

pub use extract::{AuthUser, Principal};
pub use issuer::SessionIssuer;

use crate::errors::AppError;

/// How a successful login is carried back to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthTransport {
    /// Opaque `sid` cookie pointing at a server-side session record.
    #[default]
    CookieSession,
    /// Signed token in the `token` cookie (and in the login body for API clients).
    SignedToken,
}

impl FromStr for AuthTransport {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "session" | "cookie" => Ok(AuthTransport::CookieSession),
            "token" | "jwt" => Ok(AuthTransport::SignedToken),
            other => anyhow::bail!("AUTH_TRANSPORT must be 'session' or 'token', got '{other}'"),
        }
    }
}

/// Ownership check for every single-record read and mutation. A record owned by
/// someone else is reported exactly like a missing one.
pub fn ensure_owner<T>(
    record: Option<T>,
    owner_of: impl Fn(&T) -> i64,
    principal: &Principal,
    what: &str,
    id: i64,
) -> Result<T, AppError> {
    match record {
        Some(record) if owner_of(&record) == principal.user_id => Ok(record),
        Some(_) => {
            tracing::warn!(
                user_id = principal.user_id,
                record = what,
                record_id = id,
                "Ownership check failed"
            );
            Err(AppError::NotFound(format!("{what} {id} not found")))
        }
        None => Err(AppError::NotFound(format!("{what} {id} not found"))),
    }
}
