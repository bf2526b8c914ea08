use std::sync::Arc;

use crate::auth::oauth::OAuthRegistry;
use crate::auth::SessionIssuer;
use crate::config::Config;
use crate::optimizer::ContentOptimizer;
use crate::store::{DocumentStore, JobStore};

/// Shared application state injected into all route handlers via Axum extractors.
///
/// The stores are trait objects so the same handlers run on Postgres or on the
/// in-memory store. Accounts are reached through `issuer`.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub issuer: SessionIssuer,
    pub oauth: OAuthRegistry,
    pub optimizer: Arc<dyn ContentOptimizer>,
    pub config: Config,
}
