//! Turns whatever credential a request presents into an authenticated `Principal`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::cookies::{SESSION_COOKIE, TOKEN_COOKIE};
use crate::errors::AppError;
use crate::models::user::Role;
use crate::state::AppState;

/// The credential a principal was authenticated with; logout needs it to revoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Session { id: String },
    Token { jti: String, expires_at: i64 },
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
    pub csrf_token: String,
    pub credential: Credential,
}

/// Raw credentials found on a request, before any of them is checked.
#[derive(Debug, Clone, Default)]
pub struct PresentedCredentials {
    pub bearer: Option<String>,
    pub token_cookie: Option<String>,
    pub session_cookie: Option<String>,
}

impl PresentedCredentials {
    pub fn from_request(headers: &HeaderMap, jar: &CookieJar) -> Self {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        PresentedCredentials {
            bearer,
            token_cookie: jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()),
            session_cookie: jar.get(SESSION_COOKIE).map(|c| c.value().to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bearer.is_none() && self.token_cookie.is_none() && self.session_cookie.is_none()
    }
}

/// Extractor for handlers that require a logged-in user.
///
/// ```ignore
/// async fn handler(AuthUser(principal): AuthUser) -> ... { }
/// ```
pub struct AuthUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let presented = PresentedCredentials::from_request(&parts.headers, &jar);
        let principal = state.issuer.authenticate(&presented).await?;
        Ok(AuthUser(principal))
    }
}
