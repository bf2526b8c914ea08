//! Signed (HS256) token issuance and validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::{Role, User};

/// Claims carried by every signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Token id, the revocation handle used by logout.
    pub jti: String,
    /// CSRF token bound to this login; echoed in `X-CSRF-Token` by cookie clients.
    pub csrf: String,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Issues and validates signed tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token for the user, bound to the given CSRF token.
    pub fn issue(
        &self,
        user: &User,
        csrf: &str,
    ) -> Result<(String, Claims), jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl_secs,
            jti: Uuid::new_v4().to_string(),
            csrf: csrf.to_string(),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, claims))
    }

    /// Validate signature and expiry and return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: 42,
            email: "alice@example.com".to_string(),
            password_hash: None,
            display_name: "Alice".to_string(),
            role: Role::User,
            google_id: None,
            apple_id: None,
            microsoft_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret-key-for-testing-0123456789", 3600)
    }

    #[test]
    fn issue_and_validate() {
        let signer = signer();
        let (token, issued) = signer.issue(&user(), "csrf-1").unwrap();
        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.csrf, "csrf-1");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn wrong_secret_fails_validation() {
        let (token, _) = signer().issue(&user(), "csrf").unwrap();
        let other = TokenSigner::new(b"a-completely-different-secret-value!!", 3600);
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn expired_token_fails_validation() {
        let signer = TokenSigner::new(b"test-secret-key-for-testing-0123456789", -10);
        let (token, _) = signer.issue(&user(), "csrf").unwrap();
        assert!(signer.validate(&token).is_err());
    }

    #[test]
    fn garbage_fails_validation() {
        assert!(signer().validate("not-a-token").is_err());
    }

    #[test]
    fn each_token_gets_a_fresh_id() {
        let signer = signer();
        let (_, a) = signer.issue(&user(), "csrf").unwrap();
        let (_, b) = signer.issue(&user(), "csrf").unwrap();
        assert_ne!(a.jti, b.jti);
    }
}
