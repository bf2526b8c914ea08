pub mod health;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::auth::csrf::csrf_guard;
use crate::auth::handlers as auth;
use crate::documents::{cover_letters, resumes};
use crate::jobs::handlers as jobs;
use crate::optimizer::handlers as optimizer;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/auth/register", post(auth::handle_register))
        .route("/api/auth/login", post(auth::handle_login))
        .route("/api/auth/logout", post(auth::handle_logout))
        .route("/api/auth/me", get(auth::handle_me))
        .route("/api/auth/csrf-token", get(auth::handle_csrf_token))
        .route("/api/auth/account", delete(auth::handle_delete_account))
        .route("/api/auth/:provider", get(auth::handle_oauth_start))
        .route(
            "/api/auth/:provider/callback",
            get(auth::handle_oauth_callback).post(auth::handle_oauth_callback_form),
        )
        // Jobs and statuses
        .route(
            "/api/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_create_job),
        )
        .route(
            "/api/jobs/:id",
            get(jobs::handle_get_job)
                .put(jobs::handle_update_job)
                .delete(jobs::handle_delete_job),
        )
        .route("/api/jobs/:id/statuses", get(jobs::handle_job_statuses))
        .route(
            "/api/statuses",
            get(jobs::handle_list_statuses).post(jobs::handle_add_status),
        )
        // Documents
        .route(
            "/api/resumes",
            get(resumes::handle_list_resumes).post(resumes::handle_create_resume),
        )
        .route(
            "/api/resumes/:id",
            get(resumes::handle_get_resume)
                .put(resumes::handle_update_resume)
                .delete(resumes::handle_delete_resume),
        )
        .route(
            "/api/cover-letters",
            get(cover_letters::handle_list_cover_letters)
                .post(cover_letters::handle_create_cover_letter),
        )
        .route(
            "/api/cover-letters/:id",
            get(cover_letters::handle_get_cover_letter)
                .put(cover_letters::handle_update_cover_letter)
                .delete(cover_letters::handle_delete_cover_letter),
        )
        // Optimization
        .route("/api/optimize", post(optimizer::handle_optimize))
        .layer(middleware::from_fn_with_state(state.clone(), csrf_guard))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{
            header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
            Method, Request, StatusCode,
        },
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::oauth::{OAuthError, OAuthProvider, OAuthRegistry, ProviderProfile};
    use crate::auth::session::{MemorySessionBackend, SessionStore};
    use crate::auth::{AuthTransport, SessionIssuer};
    use crate::config::Config;
    use crate::models::user::OAuthProviderKind;
    use crate::optimizer::{ContentOptimizer, OptimizeKind, OptimizerError, UnconfiguredOptimizer};
    use crate::store::MemoryStore;

    struct EchoOptimizer;

    #[async_trait]
    impl ContentOptimizer for EchoOptimizer {
        async fn optimize(
            &self,
            _kind: OptimizeKind,
            content: &str,
            _job_description: Option<&str>,
        ) -> Result<String, OptimizerError> {
            Ok(format!("optimized: {content}"))
        }
    }

    /// Signs everyone in as the same Google account; the code becomes the subject.
    struct StubGoogle;

    #[async_trait]
    impl OAuthProvider for StubGoogle {
        fn kind(&self) -> OAuthProviderKind {
            OAuthProviderKind::Google
        }

        fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
            Ok(format!("https://accounts.google.test/auth?state={state}"))
        }

        async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, OAuthError> {
            Ok(ProviderProfile {
                provider: OAuthProviderKind::Google,
                provider_id: format!("google-{code}"),
                email: Some("carol@example.com".to_string()),
                name: Some("Carol".to_string()),
            })
        }
    }

    fn app_with(config: Config, optimizer: Arc<dyn ContentOptimizer>) -> Router {
        build_app(config, optimizer, OAuthRegistry::default())
    }

    fn build_app(
        config: Config,
        optimizer: Arc<dyn ContentOptimizer>,
        oauth: OAuthRegistry,
    ) -> Router {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(Arc::new(MemorySessionBackend::new()));
        let issuer = SessionIssuer::new(store.clone(), sessions, &config);
        build_router(AppState {
            jobs: store.clone(),
            documents: store,
            issuer,
            oauth,
            optimizer,
            config,
        })
    }

    fn app() -> Router {
        app_with(Config::for_tests(), Arc::new(EchoOptimizer))
    }

    /// A browser-like client: keeps cookies and echoes the CSRF token it was given.
    struct Client {
        app: Router,
        cookies: HashMap<String, String>,
        csrf: Option<String>,
        bearer: Option<String>,
    }

    impl Client {
        fn new(app: &Router) -> Self {
            Self {
                app: app.clone(),
                cookies: HashMap::new(),
                csrf: None,
                bearer: None,
            }
        }

        async fn send(
            &mut self,
            method: Method,
            path: &str,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(path);
            if !self.cookies.is_empty() {
                let header = self
                    .cookies
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                builder = builder.header(COOKIE, header);
            }
            if let Some(csrf) = &self.csrf {
                builder = builder.header("x-csrf-token", csrf);
            }
            if let Some(token) = &self.bearer {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let body = match body {
                Some(value) => {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .app
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();

            for set_cookie in response.headers().get_all(SET_COOKIE) {
                let raw = set_cookie.to_str().unwrap();
                let pair = raw.split(';').next().unwrap();
                let (name, value) = pair.split_once('=').unwrap();
                if value.is_empty() || raw.contains("Max-Age=0") {
                    self.cookies.remove(name);
                } else {
                    self.cookies.insert(name.to_string(), value.to_string());
                }
            }

            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn get(&mut self, path: &str) -> (StatusCode, Value) {
            self.send(Method::GET, path, None).await
        }

        async fn post(&mut self, path: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, path, Some(body)).await
        }

        async fn put(&mut self, path: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::PUT, path, Some(body)).await
        }

        async fn delete(&mut self, path: &str) -> (StatusCode, Value) {
            self.send(Method::DELETE, path, None).await
        }

        async fn register(&mut self, email: &str, password: &str) -> (StatusCode, Value) {
            self.post(
                "/api/auth/register",
                json!({"email": email, "password": password, "displayName": "Test"}),
            )
            .await
        }

        /// Fetches a CSRF token (creating the pre-session) and logs in with it.
        async fn login(&mut self, email: &str, password: &str) -> (StatusCode, Value) {
            let (status, body) = self.get("/api/auth/csrf-token").await;
            assert_eq!(status, StatusCode::OK);
            self.csrf = body["csrfToken"].as_str().map(str::to_string);
            let (status, body) = self
                .post(
                    "/api/auth/login",
                    json!({"email": email, "password": password}),
                )
                .await;
            if status == StatusCode::OK {
                self.csrf = body["csrfToken"].as_str().map(str::to_string);
            }
            (status, body)
        }
    }

    async fn logged_in(app: &Router, email: &str) -> Client {
        let mut client = Client::new(app);
        let (status, _) = client.register(email, "Secret123!").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = client.login(email, "Secret123!").await;
        assert_eq!(status, StatusCode::OK);
        client
    }

    async fn create_job(client: &mut Client, status: &str) -> (StatusCode, Value) {
        client
            .post(
                "/api/jobs",
                json!({"title": "SWE", "company": "Acme", "status": status}),
            )
            .await
    }

    #[tokio::test]
    async fn health_reports_memory_backends() {
        let (status, body) = Client::new(&app()).get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let app = app();
        let mut client = Client::new(&app);
        let (status, body) = client.register("alice@example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Test");
        assert_eq!(body["role"], "user");

        let (status, body) = client.login("alice@example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert!(body["user"].get("password_hash").is_none());
        assert!(body.get("token").is_none());
        assert!(client.cookies.contains_key("sid"));

        let (status, body) = client.get("/api/auth/me").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let app = app();
        let mut client = Client::new(&app);
        client.register("alice@example.com", "Secret123!").await;
        let (status, body) = client.register(" alice@example.com ", "Other1234!").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "DUPLICATE_EMAIL");

        // The first registration keeps its password.
        let (status, _) = client.login("alice@example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn emails_differing_in_case_are_separate_accounts() {
        let app = app();
        let mut client = Client::new(&app);
        let (status, _) = client.register("Bob@Example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = client.register("bob@example.com", "Other1234!").await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = client.login("Bob@Example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "Bob@Example.com");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_identical() {
        let app = app();
        let mut client = Client::new(&app);
        client.register("alice@example.com", "Secret123!").await;
        let wrong = client.login("alice@example.com", "Wrong1234!").await;
        let unknown = client.login("nobody@example.com", "Secret123!").await;
        assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn jobs_cannot_start_rejected() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, body) = create_job(&mut alice, "Rejected").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_INITIAL_STATUS");

        for initial in ["Saved", "Applied", "Interviewing", "Offer"] {
            let (status, body) = create_job(&mut alice, initial).await;
            assert_eq!(status, StatusCode::CREATED, "{initial}");
            assert_eq!(body["status"], initial);
        }
    }

    #[tokio::test]
    async fn alice_cannot_reopen_a_rejected_job() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, job) = create_job(&mut alice, "Saved").await;
        assert_eq!(status, StatusCode::CREATED);
        let path = format!("/api/jobs/{}", job["id"]);

        let (status, body) = alice.put(&path, json!({"status": "Rejected"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Rejected");

        let (status, body) = alice.put(&path, json!({"status": "Applied"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "TERMINAL_STATE_VIOLATION");

        let (_, body) = alice.get(&path).await;
        assert_eq!(body["status"], "Rejected");

        // Re-asserting Rejected and editing other fields still works.
        let (status, body) = alice
            .put(&path, json!({"status": "rejected", "notes": "no reply"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Rejected");
        assert_eq!(body["notes"], "no reply");

        let (_, body) = alice.get(&format!("{path}/statuses")).await;
        assert_eq!(body["statuses"], json!(["Rejected"]));
    }

    #[tokio::test]
    async fn any_non_terminal_reassignment_is_allowed() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (_, job) = create_job(&mut alice, "Saved").await;
        let path = format!("/api/jobs/{}", job["id"]);
        for next in ["Offer", "Saved", "Interviewing", "Applied", "Offer"] {
            let (status, body) = alice.put(&path, json!({"status": next})).await;
            assert_eq!(status, StatusCode::OK, "to {next}");
            assert_eq!(body["status"], next);
        }
    }

    #[tokio::test]
    async fn custom_statuses_dedupe_case_insensitively() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, body) = alice
            .post("/api/statuses", json!({"label": "Phone Screen"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"outcome": "added", "label": "Phone Screen"}));

        let (status, body) = alice
            .post("/api/statuses", json!({"label": "  phone   screen "}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"outcome": "existing", "label": "Phone Screen"}));

        let (status, body) = alice
            .post("/api/statuses", json!({"label": "APPLIED"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Applied");

        let (_, catalog) = alice.get("/api/statuses").await;
        assert_eq!(catalog["custom"], json!(["Phone Screen"]));

        let (status, job) = create_job(&mut alice, "PHONE SCREEN").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["status"], "Phone Screen");
    }

    #[tokio::test]
    async fn custom_status_limit_leaves_set_unchanged() {
        let mut config = Config::for_tests();
        config.max_custom_statuses = 2;
        let app = app_with(config, Arc::new(EchoOptimizer));
        let mut alice = logged_in(&app, "alice@example.com").await;
        for label in ["Phone Screen", "Onsite"] {
            let (status, _) = alice.post("/api/statuses", json!({"label": label})).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = alice
            .post("/api/statuses", json!({"label": "Reference Check"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "STATUS_LIMIT_EXCEEDED");

        let (_, catalog) = alice.get("/api/statuses").await;
        assert_eq!(catalog["custom"], json!(["Phone Screen", "Onsite"]));
        assert_eq!(catalog["max_custom"], 2);
    }

    #[tokio::test]
    async fn unknown_status_is_a_validation_error() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, body) = create_job(&mut alice, "Ghosted").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["fields"]["status"].is_array());
    }

    #[tokio::test]
    async fn other_users_records_are_not_found() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let mut bob = logged_in(&app, "bob@example.com").await;

        let (_, job) = create_job(&mut alice, "Saved").await;
        let job_path = format!("/api/jobs/{}", job["id"]);
        let (_, resume) = alice
            .post("/api/resumes", json!({"title": "CV", "jobId": job["id"]}))
            .await;
        let resume_path = format!("/api/resumes/{}", resume["id"]);

        for path in [&job_path, &resume_path] {
            let (status, body) = bob.get(path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            assert_eq!(body["error"]["code"], "NOT_FOUND");
            let (status, _) = bob.put(path, json!({"title": "Hacked"})).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            let (status, _) = bob.delete(path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        }

        // Bob cannot link his documents to Alice's job either.
        let (status, _) = bob
            .post("/api/cover-letters", json!({"title": "L", "jobId": job["id"]}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = alice.get(&job_path).await;
        assert_eq!(body["title"], "SWE");
        let (_, body) = alice.get(&resume_path).await;
        assert_eq!(body["title"], "CV");
        let (_, list) = bob.get("/api/jobs").await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn missing_or_wrong_csrf_token_is_rejected_before_any_write() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let real = alice.csrf.take();

        let (status, body) = create_job(&mut alice, "Saved").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "CSRF_MISMATCH");

        alice.csrf = Some("0".repeat(64));
        let (status, _) = create_job(&mut alice, "Saved").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        alice.csrf = real;
        let (_, list) = alice.get("/api/jobs").await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn login_requires_the_pre_session_csrf_token() {
        let app = app();
        let mut client = Client::new(&app);
        client.register("alice@example.com", "Secret123!").await;
        let (status, body) = client
            .post(
                "/api/auth/login",
                json!({"email": "alice@example.com", "password": "Secret123!"}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "CSRF_MISMATCH");
    }

    #[tokio::test]
    async fn login_rotates_the_session_id() {
        let app = app();
        let mut client = Client::new(&app);
        client.register("alice@example.com", "Secret123!").await;
        let (_, body) = client.get("/api/auth/csrf-token").await;
        let pre_session = client.cookies["sid"].clone();
        client.csrf = body["csrfToken"].as_str().map(str::to_string);
        let (status, body) = client
            .post(
                "/api/auth/login",
                json!({"email": "alice@example.com", "password": "Secret123!"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(client.cookies["sid"], pre_session);
        assert_eq!(body["csrfToken"].as_str(), client.csrf.as_deref());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, _) = alice.post("/api/auth/logout", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!alice.cookies.contains_key("sid"));
        let (status, body) = alice.get("/api/auth/me").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        let (status, _) = alice.post("/api/auth/logout", json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn signed_token_transport_works_for_cookies_and_bearer() {
        let mut config = Config::for_tests();
        config.auth_transport = AuthTransport::SignedToken;
        let app = app_with(config, Arc::new(EchoOptimizer));

        let mut browser = logged_in(&app, "alice@example.com").await;
        assert!(browser.cookies.contains_key("token"));
        let (status, _) = create_job(&mut browser, "Applied").await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = Client::new(&app)
            .login("alice@example.com", "Secret123!")
            .await;
        let token = body["token"].as_str().unwrap().to_string();

        // A bearer client needs no cookies and no CSRF header.
        let mut api = Client::new(&app);
        api.bearer = Some(token);
        let (status, _) = create_job(&mut api, "Saved").await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, list) = api.get("/api/jobs").await;
        assert_eq!(list.as_array().unwrap().len(), 2);

        let (status, _) = api.post("/api/auth/logout", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = api.get("/api/jobs").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_body_is_a_validation_error() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, body) = alice
            .post("/api/jobs", json!({"title": "", "company": "Acme"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["fields"]["title"].is_array());

        let (status, body) = alice.post("/api/jobs", json!({"company": 5})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unconfigured_oauth_provider_is_not_found() {
        let (status, _) = Client::new(&app()).get("/api/auth/google").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = Client::new(&app()).get("/api/auth/myspace").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_a_job_unlinks_its_cover_letter() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (_, job) = create_job(&mut alice, "Applied").await;
        let (status, letter) = alice
            .post(
                "/api/cover-letters",
                json!({"title": "Acme", "content": "Dear Acme", "jobId": job["id"]}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(letter["company_name"], "Acme");

        let (status, _) = alice.delete(&format!("/api/jobs/{}", job["id"])).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, letter) = alice
            .get(&format!("/api/cover-letters/{}", letter["id"]))
            .await;
        assert_eq!(letter["job_id"], Value::Null);
        assert_eq!(letter["company_name"], "Acme");
    }

    #[tokio::test]
    async fn optimize_uses_the_configured_backend() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, body) = alice
            .post(
                "/api/optimize",
                json!({"kind": "resume_summary", "content": "Rust dev"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["optimized"], "optimized: Rust dev");

        let app = app_with(Config::for_tests(), Arc::new(UnconfiguredOptimizer));
        let mut alice = logged_in(&app, "alice@example.com").await;
        let (status, body) = alice
            .post("/api/optimize", json!({"kind": "skills", "content": "Rust"}))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn deleting_the_account_removes_everything() {
        let app = app();
        let mut alice = logged_in(&app, "alice@example.com").await;
        create_job(&mut alice, "Saved").await;
        let (status, _) = alice.delete("/api/auth/account").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = alice.get("/api/jobs").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut again = Client::new(&app);
        let (status, _) = again.register("alice@example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    fn app_with_google() -> Router {
        let mut oauth = OAuthRegistry::default();
        oauth.register(Arc::new(StubGoogle));
        build_app(Config::for_tests(), Arc::new(EchoOptimizer), oauth)
    }

    #[tokio::test]
    async fn oauth_callback_creates_user_and_signs_in() {
        let app = app_with_google();
        let mut client = Client::new(&app);

        let (status, _) = client.get("/api/auth/google").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let state = client.cookies.get("oauth_state").cloned().unwrap();

        let (status, _) = client
            .get(&format!("/api/auth/google/callback?code=abc&state={state}"))
            .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert!(client.cookies.contains_key("sid"));
        assert!(!client.cookies.contains_key("oauth_state"));

        let (status, body) = client.get("/api/auth/me").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "carol@example.com");
        assert_eq!(body["name"], "Carol");
        assert_eq!(body["providers"], json!(["google"]));
    }

    #[tokio::test]
    async fn oauth_callback_links_existing_password_account() {
        let app = app_with_google();
        let mut client = Client::new(&app);
        let (status, _) = client.register("carol@example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::CREATED);

        client.get("/api/auth/google").await;
        let state = client.cookies.get("oauth_state").cloned().unwrap();
        let (status, _) = client
            .get(&format!("/api/auth/google/callback?code=abc&state={state}"))
            .await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let (_, body) = client.get("/api/auth/me").await;
        assert_eq!(body["providers"], json!(["google"]));

        // The password still works after linking.
        let mut other = Client::new(&app);
        let (status, _) = other.login("carol@example.com", "Secret123!").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn oauth_callback_rejects_state_mismatch() {
        let app = app_with_google();
        let mut client = Client::new(&app);
        client.get("/api/auth/google").await;

        let (status, body) = client
            .get("/api/auth/google/callback?code=abc&state=forged")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTHENTICATION_FAILED");
        assert!(!client.cookies.contains_key("sid"));
    }
}
