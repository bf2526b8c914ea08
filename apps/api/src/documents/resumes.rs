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
use crate::models::resume::{ResumeDraft, ResumeRow, ResumeSections};
use crate::state::AppState;
use crate::validation::{FieldChecker, Validate, ValidJson};

const MAX_TITLE_LEN: usize = 200;
const MAX_SUMMARY_LEN: usize = 5_000;
const MAX_ENTRIES: usize = 50;

/// Body of both create and (full-replacement) update.
#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<i64>,
    pub title: String,
    #[serde(flatten)]
    pub sections: ResumeSections,
}

impl Validate for ResumeRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.required("title", &self.title);
        checker.max_len("title", &self.title, MAX_TITLE_LEN);
        checker.max_len("summary", &self.sections.summary, MAX_SUMMARY_LEN);

        let s = &self.sections;
        let counts = [
            ("experience", s.experience.len()),
            ("education", s.education.len()),
            ("skills", s.skills.len()),
            ("projects", s.projects.len()),
            ("achievements", s.achievements.len()),
        ];
        for (field, count) in counts {
            if count > MAX_ENTRIES {
                checker.add(field, format!("must have at most {MAX_ENTRIES} entries"));
            }
        }
        if s.skills.iter().any(|skill| skill.name.trim().is_empty()) {
            checker.add("skills", "every skill needs a name");
        }
        checker.finish()
    }
}

impl ResumeRequest {
    fn into_draft(self) -> ResumeDraft {
        ResumeDraft {
            job_id: self.job_id,
            title: self.title.trim().to_string(),
            sections: self.sections,
        }
    }
}

async fn owned_resume(
    state: &AppState,
    principal: &Principal,
    id: i64,
) -> Result<ResumeRow, AppError> {
    let resume = state.documents.get_resume(id).await?;
    ensure_owner(resume, |r| r.user_id, principal, "Resume", id)
}

/// GET /api/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<ResumeRow>>, AppError> {
    Ok(Json(state.documents.list_resumes(principal.user_id).await?))
}

/// GET /api/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ResumeRow>, AppError> {
    Ok(Json(owned_resume(&state, &principal, id).await?))
}

/// POST /api/resumes
pub async fn handle_create_resume(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidJson(req): ValidJson<ResumeRequest>,
) -> Result<(StatusCode, Json<ResumeRow>), AppError> {
    linked_job(&state, &principal, req.job_id).await?;
    let resume = state
        .documents
        .create_resume(principal.user_id, req.into_draft())
        .await?;
    info!(user_id = principal.user_id, resume_id = resume.id, "Resume created");
    Ok((StatusCode::CREATED, Json(resume)))
}

/// PUT /api/resumes/:id
pub async fn handle_update_resume(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<ResumeRequest>,
) -> Result<Json<ResumeRow>, AppError> {
    owned_resume(&state, &principal, id).await?;
    linked_job(&state, &principal, req.job_id).await?;
    state
        .documents
        .update_resume(principal.user_id, id, req.into_draft())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))
}

/// DELETE /api/resumes/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    owned_resume(&state, &principal, id).await?;
    if !state.documents.delete_resume(principal.user_id, id).await? {
        return Err(AppError::NotFound(format!("Resume {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
