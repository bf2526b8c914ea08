//! OAuth 2.0 / OpenID Connect sign-in providers.
//!
//! Every provider runs the authorization-code flow and reads the profile from
//! the `id_token` the token endpoint returns. The token's signature is checked
//! against the provider's published JWKS, then `aud`, `exp` and (where stable)
//! `iss`. An email only reaches the profile when the provider vouches for it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{Config, OAuthCredentials};
use crate::errors::AppError;
use crate::models::user::OAuthProviderKind;

/// What a provider tells us about the person signing in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: OAuthProviderKind,
    pub provider_id: String,
    /// Only set when the provider vouches for it.
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("token response carried no id_token")]
    MissingIdToken,

    #[error("invalid id_token: {0}")]
    InvalidIdToken(String),
}

impl From<jsonwebtoken::errors::Error> for OAuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        OAuthError::InvalidIdToken(err.to_string())
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::InvalidUrl(_) => AppError::Internal(anyhow::Error::new(err)),
            other => AppError::AuthenticationFailed(other.to_string()),
        }
    }
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> OAuthProviderKind;

    /// Where to send the browser to start sign-in.
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Trades the callback's authorization code for the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, OAuthError>;
}

/// Static description of an OpenID Connect provider.
#[derive(Debug, Clone)]
struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    /// Published signing keys for `id_token`s.
    jwks: &'static str,
    scope: &'static str,
    /// Accepted `iss` values. Empty means not checked (multi-tenant issuers).
    issuers: &'static [&'static str],
    /// Apple posts the callback back as a form instead of a query string.
    form_post: bool,
}

const GOOGLE: Endpoints = Endpoints {
    authorize: "https://accounts.google.com/o/oauth2/v2/auth",
    token: "https://oauth2.googleapis.com/token",
    jwks: "https://www.googleapis.com/oauth2/v3/certs",
    scope: "openid email profile",
    issuers: &["https://accounts.google.com", "accounts.google.com"],
    form_post: false,
};

const MICROSOFT: Endpoints = Endpoints {
    authorize: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
    token: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
    jwks: "https://login.microsoftonline.com/common/discovery/v2.0/keys",
    scope: "openid email profile",
    issuers: &[],
    form_post: false,
};

const APPLE: Endpoints = Endpoints {
    authorize: "https://appleid.apple.com/auth/authorize",
    token: "https://appleid.apple.com/auth/token",
    jwks: "https://appleid.apple.com/auth/keys",
    scope: "name email",
    issuers: &["https://appleid.apple.com"],
    form_post: true,
};

/// Signing keys are refetched after this long.
const KEYS_MAX_AGE: Duration = Duration::from_secs(60 * 60);
/// An unknown `kid` triggers a refetch, but not more often than this.
const KEYS_MIN_REFRESH: Duration = Duration::from_secs(60);

/// A provider's JWKS, cached between sign-ins.
struct SigningKeys {
    uri: &'static str,
    http: reqwest::Client,
    cached: RwLock<Option<(Instant, Arc<JwkSet>)>>,
}

impl SigningKeys {
    fn new(uri: &'static str, http: reqwest::Client) -> Self {
        Self {
            uri,
            http,
            cached: RwLock::new(None),
        }
    }

    /// The key set to verify a token signed with `kid`. Keys rotate, so a `kid`
    /// missing from the cache forces a refetch.
    async fn for_kid(&self, kid: &str) -> Result<Arc<JwkSet>, OAuthError> {
        if let Some((fetched_at, keys)) = self.cached.read().await.as_ref() {
            let age = fetched_at.elapsed();
            if age < KEYS_MAX_AGE && (keys.find(kid).is_some() || age < KEYS_MIN_REFRESH) {
                return Ok(keys.clone());
            }
        }

        let keys: JwkSet = self
            .http
            .get(self.uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let keys = Arc::new(keys);
        *self.cached.write().await = Some((Instant::now(), keys.clone()));
        Ok(keys)
    }
}

pub struct OidcProvider {
    kind: OAuthProviderKind,
    endpoints: Endpoints,
    credentials: OAuthCredentials,
    redirect_uri: String,
    http: reqwest::Client,
    keys: SigningKeys,
}

impl OidcProvider {
    fn new(
        kind: OAuthProviderKind,
        endpoints: Endpoints,
        credentials: OAuthCredentials,
        public_url: &str,
        http: reqwest::Client,
    ) -> Self {
        let redirect_uri = format!(
            "{}/api/auth/{}/callback",
            public_url.trim_end_matches('/'),
            kind
        );
        Self {
            kind,
            keys: SigningKeys::new(endpoints.jwks, http.clone()),
            endpoints,
            credentials,
            redirect_uri,
            http,
        }
    }

    pub fn google(credentials: OAuthCredentials, public_url: &str, http: reqwest::Client) -> Self {
        Self::new(OAuthProviderKind::Google, GOOGLE, credentials, public_url, http)
    }

    pub fn microsoft(
        credentials: OAuthCredentials,
        public_url: &str,
        http: reqwest::Client,
    ) -> Self {
        Self::new(OAuthProviderKind::Microsoft, MICROSOFT, credentials, public_url, http)
    }

    /// `client_secret` must be the pre-generated client-secret JWT Apple expects.
    pub fn apple(credentials: OAuthCredentials, public_url: &str, http: reqwest::Client) -> Self {
        Self::new(OAuthProviderKind::Apple, APPLE, credentials, public_url, http)
    }

    async fn verify(&self, id_token: &str) -> Result<IdTokenClaims, OAuthError> {
        let header = jsonwebtoken::decode_header(id_token)?;
        let kid = header
            .kid
            .ok_or_else(|| OAuthError::InvalidIdToken("no key id in header".to_string()))?;
        let keys = self.keys.for_kid(&kid).await?;
        verify_id_token(
            id_token,
            &keys,
            &self.credentials.client_id,
            self.endpoints.issuers,
        )
    }

    fn profile_from_claims(&self, claims: IdTokenClaims) -> ProviderProfile {
        let email = if claims.email_is_verified(self.kind) {
            claims.email
        } else {
            None
        };
        ProviderProfile {
            provider: self.kind,
            provider_id: claims.sub,
            email,
            name: claims.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[async_trait]
impl OAuthProvider for OidcProvider {
    fn kind(&self) -> OAuthProviderKind {
        self.kind
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let mut params = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.endpoints.scope),
            ("state", state),
        ];
        if self.endpoints.form_post {
            params.push(("response_mode", "form_post"));
        }
        let url = reqwest::Url::parse_with_params(self.endpoints.authorize, &params)
            .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(self.endpoints.token)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.kind, status = status.as_u16(), "Token exchange rejected");
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenResponse = response.json().await?;
        let id_token = tokens.id_token.ok_or(OAuthError::MissingIdToken)?;
        let claims = self.verify(&id_token).await?;
        Ok(self.profile_from_claims(claims))
    }
}

/// The `id_token` claims this service reads. `aud`, `exp` and `iss` are
/// checked by `verify_id_token` before these are looked at.
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Google sends a bool, Apple sends `"true"`/`"false"`.
    #[serde(default)]
    pub email_verified: Option<Value>,
    /// Microsoft only: the email's domain owner is verified for the tenant.
    #[serde(default)]
    pub xms_edov: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
}

fn is_true(claim: &Option<Value>) -> bool {
    match claim {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true") || s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

impl IdTokenClaims {
    /// An absent claim means unverified. Microsoft never sends `email_verified`
    /// for work accounts and lets tenants edit `email`, so it also counts `xms_edov`.
    pub fn email_is_verified(&self, provider: OAuthProviderKind) -> bool {
        match provider {
            OAuthProviderKind::Microsoft => {
                is_true(&self.email_verified) || is_true(&self.xms_edov)
            }
            OAuthProviderKind::Google | OAuthProviderKind::Apple => is_true(&self.email_verified),
        }
    }
}

/// Checks the signature with the matching key from `keys`, then `aud`, `exp` and,
/// when `issuers` is non-empty, `iss`.
pub fn verify_id_token(
    id_token: &str,
    keys: &JwkSet,
    client_id: &str,
    issuers: &[&str],
) -> Result<IdTokenClaims, OAuthError> {
    let header = jsonwebtoken::decode_header(id_token)?;
    let jwk = header
        .kid
        .as_deref()
        .and_then(|kid| keys.find(kid))
        .ok_or_else(|| OAuthError::InvalidIdToken("unknown signing key".to_string()))?;
    let key = DecodingKey::from_jwk(jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.set_audience(&[client_id]);
    if !issuers.is_empty() {
        validation.set_issuer(issuers);
    }
    validation.set_required_spec_claims(&["exp", "aud", "sub"]);

    Ok(jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)?.claims)
}

/// Configured providers by kind. A provider without credentials is simply absent.
#[derive(Clone, Default)]
pub struct OAuthRegistry {
    providers: HashMap<OAuthProviderKind, Arc<dyn OAuthProvider>>,
}

impl OAuthRegistry {
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let mut registry = Self::default();
        if let Some(creds) = &config.google {
            registry.register(Arc::new(OidcProvider::google(
                creds.clone(),
                &config.public_url,
                http.clone(),
            )));
        }
        if let Some(creds) = &config.microsoft {
            registry.register(Arc::new(OidcProvider::microsoft(
                creds.clone(),
                &config.public_url,
                http.clone(),
            )));
        }
        if let Some(creds) = &config.apple {
            registry.register(Arc::new(OidcProvider::apple(
                creds.clone(),
                &config.public_url,
                http,
            )));
        }
        info!(
            providers = ?registry.providers.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "OAuth providers configured"
        );
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: OAuthProviderKind) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&kind).cloned()
    }
}
