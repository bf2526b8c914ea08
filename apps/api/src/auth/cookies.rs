use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::issuer::IssuedCredential;

pub const SESSION_COOKIE: &str = "sid";
pub const TOKEN_COOKIE: &str = "token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_STATE_TTL_SECS: i64 = 10 * 60;

fn credential_cookie(
    name: &'static str,
    value: String,
    max_age_secs: i64,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// Sets the cookie for the issued credential and clears the other transport's cookie.
pub fn apply_credential(jar: CookieJar, issued: &IssuedCredential, secure: bool) -> CookieJar {
    match issued {
        IssuedCredential::Session { id, ttl_secs, .. } => jar
            .add(credential_cookie(SESSION_COOKIE, id.clone(), *ttl_secs, secure))
            .remove(removal(TOKEN_COOKIE)),
        IssuedCredential::Token {
            token, ttl_secs, ..
        } => jar
            .add(credential_cookie(TOKEN_COOKIE, token.clone(), *ttl_secs, secure))
            .remove(removal(SESSION_COOKIE)),
    }
}

/// Cookie carrying an anonymous pre-session, used only so login can be CSRF-protected.
pub fn pre_session(jar: CookieJar, id: String, ttl_secs: i64, secure: bool) -> CookieJar {
    jar.add(credential_cookie(SESSION_COOKIE, id, ttl_secs, secure))
}

pub fn clear_credentials(jar: CookieJar) -> CookieJar {
    jar.remove(removal(SESSION_COOKIE)).remove(removal(TOKEN_COOKIE))
}

/// Apple returns with a cross-site `form_post`, so the state cookie must be
/// `SameSite=None`, which browsers only accept together with `Secure`.
pub fn oauth_state(jar: CookieJar, state: String) -> CookieJar {
    jar.add(
        Cookie::build((OAUTH_STATE_COOKIE, state))
            .http_only(true)
            .same_site(SameSite::None)
            .secure(true)
            .path("/api/auth")
            .max_age(time::Duration::seconds(OAUTH_STATE_TTL_SECS))
            .build(),
    )
}

pub fn clear_oauth_state(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build((OAUTH_STATE_COOKIE, "")).path("/api/auth").build())
}
