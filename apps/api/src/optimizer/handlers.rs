use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::optimizer::OptimizeKind;
use crate::state::AppState;
use crate::validation::{FieldChecker, Validate, ValidJson};

const MAX_CONTENT_LEN: usize = 20_000;

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub kind: OptimizeKind,
    pub content: String,
    #[serde(default, alias = "jobDescription")]
    pub job_description: Option<String>,
}

impl Validate for OptimizeRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.required("content", &self.content);
        checker.max_len("content", &self.content, MAX_CONTENT_LEN);
        checker.optional_max_len(
            "job_description",
            self.job_description.as_deref(),
            MAX_CONTENT_LEN,
        );
        checker.finish()
    }
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub optimized: String,
}

/// POST /api/optimize
pub async fn handle_optimize(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidJson(req): ValidJson<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, AppError> {
    let optimized = state
        .optimizer
        .optimize(req.kind, &req.content, req.job_description.as_deref())
        .await?;
    info!(user_id = principal.user_id, kind = ?req.kind, "Content optimized");
    Ok(Json(OptimizeResponse { optimized }))
}
