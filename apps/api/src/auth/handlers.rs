use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::cookies::{self, OAUTH_STATE_COOKIE};
use crate::auth::csrf::{random_token, tokens_match};
use crate::auth::extract::{AuthUser, PresentedCredentials};
use crate::auth::issuer::Registration;
use crate::auth::oauth::OAuthProvider;
use crate::auth::password::{MAX_PASSWORD_BYTES, MIN_PASSWORD_LEN};
use crate::errors::AppError;
use crate::models::user::{OAuthProviderKind, PublicUser, Role};
use crate::state::AppState;
use crate::validation::{FieldChecker, Validate, ValidJson};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(alias = "display_name", alias = "name")]
    pub display_name: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.email("email", &self.email);
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            checker.add(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            );
        }
        if self.password.len() > MAX_PASSWORD_BYTES {
            checker.add("password", format!("must be at most {MAX_PASSWORD_BYTES} bytes"));
        }
        checker.required("displayName", &self.display_name);
        checker.max_len("displayName", &self.display_name, MAX_NAME_LEN);
        checker.finish()
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.required("email", &self.email);
        checker.required("password", &self.password);
        checker.finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    pub csrf_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let user = state
        .issuer
        .register(Registration {
            email: req.email,
            password: req.password,
            display_name: req.display_name.trim().to_string(),
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            name: user.display_name,
            role: user.role,
        }),
    ))
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let presented = PresentedCredentials::from_request(&headers, &jar);
    let (user, issued) = state
        .issuer
        .login(&req.email, &req.password, &presented)
        .await?;
    let jar = cookies::apply_credential(jar, &issued, state.config.production);
    Ok((
        jar,
        Json(LoginResponse {
            user: PublicUser::from(&user),
            csrf_token: issued.csrf_token().to_string(),
            token: issued.token().map(str::to_string),
        }),
    ))
}

/// POST /api/auth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    let presented = PresentedCredentials::from_request(&headers, &jar);
    state.issuer.logout(&presented).await?;
    if !presented.is_empty() {
        info!("Logged out");
    }
    Ok((
        cookies::clear_credentials(jar),
        Json(MessageResponse {
            message: "Logged out",
        }),
    ))
}

/// GET /api/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.issuer.current_user(&principal).await?;
    Ok(Json(PublicUser::from(&user)))
}

/// GET /api/auth/csrf-token
///
/// Returns the token bound to the caller's credential. A caller without one gets
/// an anonymous pre-session so the login request can be protected too.
pub async fn handle_csrf_token(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<CsrfTokenResponse>), AppError> {
    let presented = PresentedCredentials::from_request(&headers, &jar);
    if let Ok(principal) = state.issuer.authenticate(&presented).await {
        return Ok((
            jar,
            Json(CsrfTokenResponse {
                csrf_token: principal.csrf_token,
            }),
        ));
    }
    if let Some(csrf_token) = state.issuer.csrf_token_for_cookies(&presented).await? {
        return Ok((jar, Json(CsrfTokenResponse { csrf_token })));
    }

    let (id, csrf_token) = state.issuer.anonymous_session().await?;
    let jar = cookies::pre_session(
        jar,
        id,
        state.issuer.pre_session_ttl_secs(),
        state.config.production,
    );
    Ok((jar, Json(CsrfTokenResponse { csrf_token })))
}

/// DELETE /api/auth/account
pub async fn handle_delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(principal): AuthUser,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    state.issuer.delete_account(&principal).await?;
    Ok((
        cookies::clear_credentials(jar),
        Json(MessageResponse {
            message: "Account deleted",
        }),
    ))
}

fn provider_for(
    state: &AppState,
    name: &str,
) -> Result<std::sync::Arc<dyn OAuthProvider>, AppError> {
    OAuthProviderKind::parse(name)
        .and_then(|kind| state.oauth.get(kind))
        .ok_or_else(|| AppError::NotFound(format!("Sign-in provider '{name}' not found")))
}

/// GET /api/auth/:provider
pub async fn handle_oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider = provider_for(&state, &provider)?;
    let oauth_state = random_token();
    let url = provider.authorize_url(&oauth_state)?;
    Ok((cookies::oauth_state(jar, oauth_state), Redirect::to(&url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /api/auth/:provider/callback
pub async fn handle_oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), AppError> {
    complete_oauth(&state, &provider, jar, params).await
}

/// POST /api/auth/:provider/callback (Apple `form_post`)
pub async fn handle_oauth_callback_form(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Result<(CookieJar, Redirect), AppError> {
    complete_oauth(&state, &provider, jar, params).await
}

async fn complete_oauth(
    state: &AppState,
    provider_name: &str,
    jar: CookieJar,
    params: CallbackParams,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider = provider_for(state, provider_name)?;

    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = cookies::clear_oauth_state(jar);

    if let Some(error) = params.error {
        return Err(AppError::AuthenticationFailed(format!(
            "{provider_name} returned error '{error}'"
        )));
    }
    match (expected_state.as_deref(), params.state.as_deref()) {
        (Some(expected), Some(supplied)) if tokens_match(expected, supplied) => {}
        _ => {
            warn!(provider = provider_name, "OAuth state mismatch");
            return Err(AppError::AuthenticationFailed(
                "OAuth state mismatch".to_string(),
            ));
        }
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::AuthenticationFailed("missing authorization code".to_string()))?;

    let profile = provider.exchange_code(&code).await?;
    let user = state.issuer.oauth_sign_in(profile).await?;
    let issued = state.issuer.establish(&user, None).await?;
    info!(user_id = user.id, provider = provider_name, "OAuth sign-in");

    let jar = cookies::apply_credential(jar, &issued, state.config.production);
    Ok((jar, Redirect::to(&state.config.app_url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_accepts_name_aliases() {
        for body in [
            r#"{"email":"a@example.com","password":"Secret123!","displayName":"A"}"#,
            r#"{"email":"a@example.com","password":"Secret123!","display_name":"A"}"#,
            r#"{"email":"a@example.com","password":"Secret123!","name":"A"}"#,
        ] {
            let req: RegisterRequest = serde_json::from_str(body).unwrap();
            assert_eq!(req.display_name, "A");
            assert!(req.validate().is_ok());
        }
    }

    #[test]
    fn register_request_rejects_bad_fields() {
        let req = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            display_name: " ".to_string(),
        };
        match req.validate() {
            Err(AppError::Validation { fields, .. }) => {
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("password"));
                assert!(fields.contains_key("displayName"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn overlong_password_is_rejected() {
        let req = RegisterRequest {
            email: "a@example.com".to_string(),
            password: "x".repeat(MAX_PASSWORD_BYTES + 1),
            display_name: "A".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
