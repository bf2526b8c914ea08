mod auth;
mod config;
mod db;
mod documents;
mod errors;
mod jobs;
mod models;
mod optimizer;
mod routes;
mod state;
mod store;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::oauth::OAuthRegistry;
use crate::auth::session::{
    MemorySessionBackend, RedisSessionBackend, SessionBackend, SessionStore,
};
use crate::auth::SessionIssuer;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::optimizer::client::LlmClient;
use crate::optimizer::{ContentOptimizer, LlmOptimizer, UnconfiguredOptimizer};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{DocumentStore, IdentityStore, JobStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: a missing JWT_SECRET stops startup here.
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http=info",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobTrail API v{}", env!("CARGO_PKG_VERSION"));

    // Persistence: PostgreSQL when configured, otherwise the in-memory store.
    let (identity, jobs, documents) = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            split_store(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is lost on restart)");
            split_store(Arc::new(MemoryStore::new()))
        }
    };

    // Sessions: Redis when configured, otherwise an in-process map.
    let session_backend: Arc<dyn SessionBackend> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let backend = RedisSessionBackend::connect(&client).await?;
            info!("Redis session backend connected");
            Arc::new(backend)
        }
        None => {
            warn!("REDIS_URL not set; sessions are kept in memory");
            Arc::new(MemorySessionBackend::new())
        }
    };
    let issuer = SessionIssuer::new(identity, SessionStore::new(session_backend), &config);
    info!(transport = ?config.auth_transport, "Session issuer ready");

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()?;
    let oauth = OAuthRegistry::from_config(&config, http);

    let optimizer: Arc<dyn ContentOptimizer> = match &config.optimizer_api_key {
        Some(key) => {
            let client = LlmClient::new(key.clone())?;
            info!("Content optimizer enabled (model: {})", optimizer::client::MODEL);
            Arc::new(LlmOptimizer(client))
        }
        None => {
            warn!("OPTIMIZER_API_KEY not set; /api/optimize will answer 503");
            Arc::new(UnconfiguredOptimizer)
        }
    };

    let state = AppState {
        jobs,
        documents,
        issuer,
        oauth,
        optimizer,
        config: config.clone(),
    };

    // Cookies carry credentials, so CORS stays same-origin unless the frontend
    // is served from APP_URL's origin.
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

type Stores = (
    Arc<dyn IdentityStore>,
    Arc<dyn JobStore>,
    Arc<dyn DocumentStore>,
);

/// One backend serves all three store traits.
fn split_store<S>(store: Arc<S>) -> Stores
where
    S: IdentityStore + JobStore + DocumentStore + 'static,
{
    (store.clone(), store.clone(), store)
}

/// Allows credentialed requests from the frontend origin named by `APP_URL`,
/// when it is an absolute URL. A relative `APP_URL` means same-origin only.
fn cors_layer(config: &Config) -> CorsLayer {
    use axum::http::{header, HeaderName, HeaderValue, Method};

    let origin = reqwest::Url::parse(&config.app_url)
        .ok()
        .map(|url| url.origin().ascii_serialization())
        .and_then(|origin| HeaderValue::from_str(&origin).ok());

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(auth::csrf::CSRF_HEADER),
            ]),
        None => CorsLayer::new(),
    }
}
