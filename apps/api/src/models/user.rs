use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

/// External identity providers a user can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProviderKind {
    Google,
    Apple,
    Microsoft,
}

impl OAuthProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProviderKind::Google => "google",
            OAuthProviderKind::Apple => "apple",
            OAuthProviderKind::Microsoft => "microsoft",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(OAuthProviderKind::Google),
            "apple" => Some(OAuthProviderKind::Apple),
            "microsoft" => Some(OAuthProviderKind::Microsoft),
            _ => None,
        }
    }
}

impl fmt::Display for OAuthProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// `None` for accounts created through OAuth; such accounts never pass password login.
    pub password_hash: Option<String>,
    pub display_name: String,
    pub role: Role,
    pub google_id: Option<String>,
    pub apple_id: Option<String>,
    pub microsoft_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn provider_id(&self, provider: OAuthProviderKind) -> Option<&str> {
        match provider {
            OAuthProviderKind::Google => self.google_id.as_deref(),
            OAuthProviderKind::Apple => self.apple_id.as_deref(),
            OAuthProviderKind::Microsoft => self.microsoft_id.as_deref(),
        }
    }
}

/// How a new account proves who it is.
#[derive(Debug, Clone)]
pub enum NewCredential {
    /// Already-hashed password; plaintext never reaches the store.
    PasswordHash(String),
    OAuth {
        provider: OAuthProviderKind,
        provider_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub credential: NewCredential,
}

/// Client-facing view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub providers: Vec<OAuthProviderKind>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        let providers = [
            OAuthProviderKind::Google,
            OAuthProviderKind::Apple,
            OAuthProviderKind::Microsoft,
        ]
        .into_iter()
        .filter(|p| user.provider_id(*p).is_some())
        .collect();
        PublicUser {
            id: user.id,
            email: user.email.clone(),
            name: user.display_name.clone(),
            role: user.role,
            providers,
            created_at: user.created_at,
        }
    }
}
