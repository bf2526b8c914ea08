use anyhow::{bail, Context, Result};

use crate::auth::AuthTransport;

const DAY_SECS: i64 = 24 * 60 * 60;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the API runs on the in-memory store.
    pub database_url: Option<String>,
    /// Redis connection string for the session backend. When unset sessions live in memory.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub auth_transport: AuthTransport,
    /// Controls the `Secure` cookie flag.
    pub production: bool,
    /// Landing route the OAuth callback redirects to.
    pub app_url: String,
    /// Externally reachable base URL of this API, used to build OAuth redirect URIs.
    pub public_url: String,
    pub google: Option<OAuthCredentials>,
    pub apple: Option<OAuthCredentials>,
    pub microsoft: Option<OAuthCredentials>,
    pub optimizer_api_key: Option<String>,
    pub bcrypt_cost: u32,
    pub session_ttl_secs: i64,
    pub token_ttl_secs: i64,
    pub max_custom_statuses: usize,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let jwt_secret = require_env("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 bytes");
        }

        let auth_transport = optional_env("AUTH_TRANSPORT")
            .map(|v| v.parse::<AuthTransport>())
            .transpose()?
            .unwrap_or_default();

        let environment = optional_env("APP_ENV")
            .or_else(|| optional_env("NODE_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let bcrypt_cost = parse_env("BCRYPT_COST", 12u32)?;
        if !(10..=12).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 10 and 12, got {bcrypt_cost}");
        }

        let session_ttl_secs = ttl_env("SESSION_TTL_SECS", 7 * DAY_SECS)?;
        let token_ttl_secs = ttl_env("TOKEN_TTL_SECS", DAY_SECS)?;

        let port = parse_env("PORT", 8080u16)?;

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            jwt_secret,
            auth_transport,
            production: environment.eq_ignore_ascii_case("production"),
            app_url: optional_env("APP_URL").unwrap_or_else(|| "/".to_string()),
            public_url: optional_env("PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            google: oauth_credentials("GOOGLE"),
            apple: oauth_credentials("APPLE"),
            microsoft: oauth_credentials("MICROSOFT"),
            optimizer_api_key: optional_env("OPTIMIZER_API_KEY"),
            bcrypt_cost,
            session_ttl_secs,
            token_ttl_secs,
            max_custom_statuses: parse_env("MAX_CUSTOM_STATUSES", 20usize)?,
            port,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn ttl_env(key: &str, default: i64) -> Result<i64> {
    ttl_in_range(key, parse_env(key, default)?)
}

/// Credential lifetimes must fall between one and seven days.
fn ttl_in_range(key: &str, secs: i64) -> Result<i64> {
    if !(DAY_SECS..=7 * DAY_SECS).contains(&secs) {
        bail!(
            "{key} must be between {} and {} seconds (1 to 7 days), got {secs}",
            DAY_SECS,
            7 * DAY_SECS
        );
    }
    Ok(secs)
}

/// Both `<PREFIX>_CLIENT_ID` and `<PREFIX>_CLIENT_SECRET` must be set for a provider to be enabled.
fn oauth_credentials(prefix: &str) -> Option<OAuthCredentials> {
    let client_id = optional_env(&format!("{prefix}_CLIENT_ID"))?;
    let client_secret = optional_env(&format!("{prefix}_CLIENT_SECRET"))?;
    Some(OAuthCredentials {
        client_id,
        client_secret,
    })
}

#[cfg(test)]
impl Config {
    /// Configuration used by router tests: memory backends, fast token expiry defaults.
    pub fn for_tests() -> Self {
        Config {
            database_url: None,
            redis_url: None,
            jwt_secret: "test-secret-key-that-is-long-enough-123".to_string(),
            auth_transport: AuthTransport::CookieSession,
            production: false,
            app_url: "/".to_string(),
            public_url: "http://localhost:8080".to_string(),
            google: None,
            apple: None,
            microsoft: None,
            optimizer_api_key: None,
            bcrypt_cost: 4,
            session_ttl_secs: 3600,
            token_ttl_secs: 3600,
            max_custom_statuses: 20,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}
