//! Session/token issuance: the single place that turns verified identities into
//! credentials and presented credentials back into principals.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::auth::csrf::random_token;
use crate::auth::extract::{Credential, PresentedCredentials, Principal};
use crate::auth::oauth::ProviderProfile;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{SessionRecord, SessionStore};
use crate::auth::token::{Claims, TokenSigner};
use crate::auth::AuthTransport;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::{NewCredential, NewUser, Role, User};
use crate::store::IdentityStore;
use crate::validation::normalize_email;

/// Verified against when the account does not exist, so unknown emails cost the
/// same bcrypt round as wrong passwords.
const TIMING_DUMMY_PASSWORD: &str = "timing-equalisation-password";

/// Lifetime of an anonymous pre-session. It only has to outlive the login form.
pub const PRE_SESSION_TTL_SECS: i64 = 15 * 60;

/// A credential handed back to the client after login or OAuth sign-in.
#[derive(Debug, Clone)]
pub enum IssuedCredential {
    Session {
        id: String,
        csrf_token: String,
        ttl_secs: i64,
    },
    Token {
        token: String,
        csrf_token: String,
        ttl_secs: i64,
    },
}

impl IssuedCredential {
    pub fn csrf_token(&self) -> &str {
        match self {
            IssuedCredential::Session { csrf_token, .. }
            | IssuedCredential::Token { csrf_token, .. } => csrf_token,
        }
    }

    /// The signed token, for API clients that send it as a bearer.
    pub fn token(&self) -> Option<&str> {
        match self {
            IssuedCredential::Token { token, .. } => Some(token),
            IssuedCredential::Session { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Clone)]
pub struct SessionIssuer {
    identity: Arc<dyn IdentityStore>,
    sessions: SessionStore,
    signer: TokenSigner,
    transport: AuthTransport,
    bcrypt_cost: u32,
    session_ttl_secs: i64,
    dummy_hash: Arc<OnceCell<String>>,
}

impl SessionIssuer {
    pub fn new(identity: Arc<dyn IdentityStore>, sessions: SessionStore, config: &Config) -> Self {
        Self {
            identity,
            sessions,
            signer: TokenSigner::new(config.jwt_secret.as_bytes(), config.token_ttl_secs),
            transport: config.auth_transport,
            bcrypt_cost: config.bcrypt_cost,
            session_ttl_secs: config.session_ttl_secs,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn transport(&self) -> AuthTransport {
        self.transport
    }

    pub fn pre_session_ttl_secs(&self) -> i64 {
        PRE_SESSION_TTL_SECS
    }

    /// Creates a password account with the `user` role.
    pub async fn register(&self, registration: Registration) -> Result<User, AppError> {
        let email = normalize_email(&registration.email);
        if self.identity.find_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }
        let hash = hash_password(&registration.password, self.bcrypt_cost).await?;
        let user = self
            .identity
            .create_user(NewUser {
                email,
                display_name: registration.display_name,
                role: Role::User,
                credential: NewCredential::PasswordHash(hash),
            })
            .await?;
        info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Checks email and password. Unknown email, OAuth-only account and wrong
    /// password all fail with the same `InvalidCredentials`.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self.identity.find_by_email(&normalize_email(email)).await?;
        let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());

        let verified = match &stored_hash {
            Some(hash) => verify_password(password, hash).await?,
            None => {
                let dummy = self.dummy_hash().await?;
                verify_password(password, &dummy).await?;
                false
            }
        };

        match user {
            Some(user) if verified => Ok(user),
            _ => {
                warn!("Login failed");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    /// Verifies the password, drops any pre-session and issues a fresh credential
    /// that keeps the caller's CSRF token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        presented: &PresentedCredentials,
    ) -> Result<(User, IssuedCredential), AppError> {
        let user = self.verify_credentials(email, password).await?;

        let carried_csrf = self.csrf_token_for_cookies(presented).await?;
        if let Some(old) = &presented.session_cookie {
            self.sessions.destroy(old).await?;
        }

        let issued = self.establish(&user, carried_csrf).await?;
        info!(user_id = user.id, transport = ?self.transport, "User logged in");
        Ok((user, issued))
    }

    /// Issues a credential for an already-verified user.
    pub async fn establish(
        &self,
        user: &User,
        csrf_token: Option<String>,
    ) -> Result<IssuedCredential, AppError> {
        let csrf_token = csrf_token.unwrap_or_else(random_token);
        match self.transport {
            AuthTransport::CookieSession => {
                let now = Utc::now();
                let record = SessionRecord {
                    user_id: Some(user.id),
                    role: Some(user.role),
                    csrf_token: csrf_token.clone(),
                    created_at: now,
                    expires_at: now + Duration::seconds(self.session_ttl_secs),
                };
                let id = self.sessions.create(&record).await?;
                Ok(IssuedCredential::Session {
                    id,
                    csrf_token,
                    ttl_secs: self.session_ttl_secs,
                })
            }
            AuthTransport::SignedToken => {
                let (token, _) = self
                    .signer
                    .issue(user, &csrf_token)
                    .map_err(anyhow::Error::from)?;
                Ok(IssuedCredential::Token {
                    token,
                    csrf_token,
                    ttl_secs: self.signer.ttl_secs(),
                })
            }
        }
    }

    /// Creates a session that holds nothing but a CSRF token. Returns `(id, csrf_token)`.
    pub async fn anonymous_session(&self) -> Result<(String, String), AppError> {
        let now = Utc::now();
        let record = SessionRecord {
            user_id: None,
            role: None,
            csrf_token: random_token(),
            created_at: now,
            expires_at: now + Duration::seconds(PRE_SESSION_TTL_SECS),
        };
        let id = self.sessions.create(&record).await?;
        Ok((id, record.csrf_token))
    }

    /// The CSRF token bound to the request's cookie credential, anonymous
    /// pre-sessions included. Bearer tokens are not consulted.
    pub async fn csrf_token_for_cookies(
        &self,
        presented: &PresentedCredentials,
    ) -> Result<Option<String>, AppError> {
        if let Some(token) = &presented.token_cookie {
            if let Some(claims) = self.valid_claims(token).await? {
                return Ok(Some(claims.csrf));
            }
        }
        if let Some(id) = &presented.session_cookie {
            if let Some(record) = self.sessions.load(id).await? {
                return Ok(Some(record.csrf_token));
            }
        }
        Ok(None)
    }

    async fn valid_claims(&self, token: &str) -> Result<Option<Claims>, AppError> {
        let claims = match self.signer.validate(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Rejected signed token: {e}");
                return Ok(None);
            }
        };
        if self.sessions.is_token_revoked(&claims.jti).await? {
            return Ok(None);
        }
        Ok(Some(claims))
    }

    /// Resolves the first credential present, in order bearer, `token` cookie, `sid`
    /// cookie. The user must still exist; an anonymous pre-session is not a login.
    pub async fn authenticate(
        &self,
        presented: &PresentedCredentials,
    ) -> Result<Principal, AppError> {
        let token = presented
            .bearer
            .as_deref()
            .or(presented.token_cookie.as_deref());

        let principal = if let Some(token) = token {
            let claims = self
                .valid_claims(token)
                .await?
                .ok_or(AppError::NotLoggedIn)?;
            let user_id = claims.user_id().ok_or(AppError::NotLoggedIn)?;
            Principal {
                user_id,
                role: claims.role,
                csrf_token: claims.csrf,
                credential: Credential::Token {
                    jti: claims.jti,
                    expires_at: claims.exp,
                },
            }
        } else if let Some(id) = &presented.session_cookie {
            let record = self
                .sessions
                .load(id)
                .await?
                .ok_or(AppError::NotLoggedIn)?;
            let (Some(user_id), Some(role)) = (record.user_id, record.role) else {
                return Err(AppError::NotLoggedIn);
            };
            Principal {
                user_id,
                role,
                csrf_token: record.csrf_token,
                credential: Credential::Session { id: id.clone() },
            }
        } else {
            return Err(AppError::NotLoggedIn);
        };

        match self.identity.find_by_id(principal.user_id).await? {
            Some(user) => Ok(Principal {
                role: user.role,
                ..principal
            }),
            None => Err(AppError::NotLoggedIn),
        }
    }

    pub async fn current_user(&self, principal: &Principal) -> Result<User, AppError> {
        self.identity
            .find_by_id(principal.user_id)
            .await?
            .ok_or(AppError::NotLoggedIn)
    }

    /// Destroys every session and revokes every token the request carries. Invalid
    /// or already-revoked credentials are ignored.
    pub async fn logout(&self, presented: &PresentedCredentials) -> Result<(), AppError> {
        if let Some(id) = &presented.session_cookie {
            self.sessions.destroy(id).await?;
        }
        for token in [&presented.bearer, &presented.token_cookie]
            .into_iter()
            .flatten()
        {
            if let Ok(claims) = self.signer.validate(token) {
                self.sessions.revoke_token(&claims.jti, claims.exp).await?;
                info!(user_id = claims.user_id(), "Token revoked");
            }
        }
        Ok(())
    }

    /// Revokes the credential a principal was authenticated with.
    pub async fn revoke(&self, principal: &Principal) -> Result<(), AppError> {
        match &principal.credential {
            Credential::Session { id } => self.sessions.destroy(id).await,
            Credential::Token { jti, expires_at } => {
                self.sessions.revoke_token(jti, *expires_at).await
            }
        }
    }

    /// Finds the account for a provider profile by email, creating it (role `user`)
    /// or linking the provider id as needed. A password hash is never touched.
    pub async fn oauth_sign_in(&self, profile: ProviderProfile) -> Result<User, AppError> {
        let email = profile
            .email
            .map(|e| normalize_email(&e))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                AppError::AuthenticationFailed(format!(
                    "{} did not return an email address",
                    profile.provider
                ))
            })?;

        let provider = profile.provider;
        match self.identity.find_by_email(&email).await? {
            Some(user) if user.provider_id(provider) == Some(profile.provider_id.as_str()) => {
                Ok(user)
            }
            Some(user) if user.provider_id(provider).is_none() => {
                let user = self
                    .identity
                    .link_provider(user.id, provider, &profile.provider_id)
                    .await?;
                info!(user_id = user.id, provider = %provider, "Linked OAuth provider");
                Ok(user)
            }
            Some(user) => {
                // A different id from the same provider; keep the existing link.
                warn!(
                    user_id = user.id,
                    provider = %provider,
                    "Provider id differs from linked id"
                );
                Ok(user)
            }
            None => {
                let display_name = profile
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
                let user = self
                    .identity
                    .create_user(NewUser {
                        email,
                        display_name,
                        role: Role::User,
                        credential: NewCredential::OAuth {
                            provider,
                            provider_id: profile.provider_id,
                        },
                    })
                    .await?;
                info!(user_id = user.id, provider = %provider, "Created account from OAuth");
                Ok(user)
            }
        }
    }

    /// Deletes the caller's account (cascading to everything it owns) and revokes
    /// the credential used.
    pub async fn delete_account(&self, principal: &Principal) -> Result<(), AppError> {
        if !self.identity.delete_user(principal.user_id).await? {
            return Err(AppError::NotLoggedIn);
        }
        self.revoke(principal).await?;
        info!(user_id = principal.user_id, "Account deleted");
        Ok(())
    }

    async fn dummy_hash(&self) -> Result<String, AppError> {
        let cost = self.bcrypt_cost;
        self.dummy_hash
            .get_or_try_init(|| async move { hash_password(TIMING_DUMMY_PASSWORD, cost).await })
            .await
            .cloned()
    }
}
