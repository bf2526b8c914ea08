use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::auth::{ensure_owner, AuthUser, Principal};
use crate::documents::linked_job;
use crate::errors::AppError;
use crate::models::cover_letter::{CoverLetterDraft, CoverLetterRow};
use crate::models::job::JobRow;
use crate::state::AppState;
use crate::validation::{FieldChecker, Validate, ValidJson};

const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 20_000;

#[derive(Debug, Deserialize)]
pub struct CoverLetterRequest {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "jobTitle")]
    pub job_title: Option<String>,
    #[serde(default, alias = "companyName")]
    pub company_name: Option<String>,
    #[serde(default, alias = "jobDescription")]
    pub job_description: Option<String>,
}

impl Validate for CoverLetterRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.required("title", &self.title);
        checker.max_len("title", &self.title, MAX_TITLE_LEN);
        checker.max_len("content", &self.content, MAX_CONTENT_LEN);
        checker.optional_max_len("job_title", self.job_title.as_deref(), MAX_TITLE_LEN);
        checker.optional_max_len("company_name", self.company_name.as_deref(), MAX_TITLE_LEN);
        checker.optional_max_len(
            "job_description",
            self.job_description.as_deref(),
            MAX_CONTENT_LEN,
        );
        checker.finish()
    }
}

impl CoverLetterRequest {
    /// Job title and company default to the linked job's, so the letter keeps
    /// them if the job is deleted later.
    fn into_draft(self, job: Option<&JobRow>) -> CoverLetterDraft {
        let job_title = self
            .job_title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| job.map(|j| j.title.clone()));
        let company_name = self
            .company_name
            .filter(|c| !c.trim().is_empty())
            .or_else(|| job.map(|j| j.company.clone()));
        let job_description = self
            .job_description
            .filter(|d| !d.trim().is_empty())
            .or_else(|| job.and_then(|j| j.role_details.clone()));
        CoverLetterDraft {
            job_id: self.job_id,
            title: self.title.trim().to_string(),
            content: self.content,
            job_title,
            company_name,
            job_description,
        }
    }
}

async fn owned_cover_letter(
    state: &AppState,
    principal: &Principal,
    id: i64,
) -> Result<CoverLetterRow, AppError> {
    let letter = state.documents.get_cover_letter(id).await?;
    ensure_owner(letter, |l| l.user_id, principal, "Cover letter", id)
}

/// GET /api/cover-letters
pub async fn handle_list_cover_letters(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<CoverLetterRow>>, AppError> {
    Ok(Json(
        state.documents.list_cover_letters(principal.user_id).await?,
    ))
}

/// GET /api/cover-letters/:id
pub async fn handle_get_cover_letter(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<CoverLetterRow>, AppError> {
    Ok(Json(owned_cover_letter(&state, &principal, id).await?))
}

/// POST /api/cover-letters
pub async fn handle_create_cover_letter(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidJson(req): ValidJson<CoverLetterRequest>,
) -> Result<(StatusCode, Json<CoverLetterRow>), AppError> {
    let job = linked_job(&state, &principal, req.job_id).await?;
    let letter = state
        .documents
        .create_cover_letter(principal.user_id, req.into_draft(job.as_ref()))
        .await?;
    info!(
        user_id = principal.user_id,
        cover_letter_id = letter.id,
        "Cover letter created"
    );
    Ok((StatusCode::CREATED, Json(letter)))
}

/// PUT /api/cover-letters/:id
pub async fn handle_update_cover_letter(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<CoverLetterRequest>,
) -> Result<Json<CoverLetterRow>, AppError> {
    owned_cover_letter(&state, &principal, id).await?;
    let job = linked_job(&state, &principal, req.job_id).await?;
    state
        .documents
        .update_cover_letter(principal.user_id, id, req.into_draft(job.as_ref()))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Cover letter {id} not found")))
}

/// DELETE /api/cover-letters/:id
pub async fn handle_delete_cover_letter(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    owned_cover_letter(&state, &principal, id).await?;
    if !state.documents.delete_cover_letter(principal.user_id, id).await? {
        return Err(AppError::NotFound(format!("Cover letter {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
