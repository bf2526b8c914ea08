//! Anti-forgery tokens for cookie-authenticated, state-changing requests.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::auth::extract::PresentedCredentials;
use crate::errors::AppError;
use crate::state::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";

/// 32 random bytes, hex encoded. Also used for session ids and OAuth `state`.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time exact match.
pub fn tokens_match(expected: &str, supplied: &str) -> bool {
    let expected = expected.as_bytes();
    let supplied = supplied.as_bytes();
    expected.len() == supplied.len() && expected.ct_eq(supplied).unwrap_u8() == 1
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Requests that carry no session to forge: account creation, logout, and the OAuth
/// callbacks (which are bound to the `state` parameter instead).
fn is_exempt_path(path: &str) -> bool {
    path == "/api/auth/register"
        || path == "/api/auth/logout"
        || (path.starts_with("/api/auth/") && path.ends_with("/callback"))
}

/// Rejects unsafe requests whose cookie credential is not accompanied by the
/// matching `X-CSRF-Token` header. Runs before any handler, so nothing is read
/// from or written to the stores on rejection beyond the session lookup.
///
/// Bearer-authenticated requests are exempt: a browser never attaches an
/// `Authorization` header cross-site on its own.
pub async fn csrf_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if is_safe_method(request.method()) || is_exempt_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let presented = PresentedCredentials::from_request(request.headers(), &jar);
    if presented.bearer.is_some() {
        return Ok(next.run(request).await);
    }

    let expected = state.issuer.csrf_token_for_cookies(&presented).await?;
    let supplied = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());

    match (expected, supplied) {
        (Some(expected), Some(supplied)) if tokens_match(&expected, supplied) => {
            Ok(next.run(request).await)
        }
        (expected, supplied) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                has_session = expected.is_some(),
                has_header = supplied.is_some(),
                "CSRF check failed"
            );
            Err(AppError::CsrfMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_are_hex_and_distinct() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tokens_match_exactly() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc123", "abc124"));
        assert!(!tokens_match("abc123", "abc12"));
        assert!(!tokens_match("abc123", "ABC123"));
        assert!(!tokens_match("abc123", ""));
    }

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt_path("/api/auth/register"));
        assert!(is_exempt_path("/api/auth/logout"));
        assert!(is_exempt_path("/api/auth/apple/callback"));
        assert!(!is_exempt_path("/api/auth/login"));
        assert!(!is_exempt_path("/api/jobs"));
    }

    #[test]
    fn test_safe_methods() {
        assert!(is_safe_method(&Method::GET));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::DELETE));
    }
}
