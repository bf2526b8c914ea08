use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{ensure_owner, AuthUser, Principal};
use crate::errors::AppError;
use crate::jobs::load_catalog;
use crate::jobs::status::{check_transition, selectable_statuses, AddOutcome, SAVED};
use crate::models::job::{ChecklistItem, JobDraft, JobRow};
use crate::state::AppState;
use crate::validation::{nullable, FieldChecker, Validate, ValidJson};

const MAX_TITLE_LEN: usize = 200;
const MAX_URL_LEN: usize = 2048;
const MAX_TEXT_LEN: usize = 10_000;
const MAX_CHECKLIST_ITEMS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "applicationDate")]
    pub application_date: Option<NaiveDate>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "companyDescription")]
    pub company_description: Option<String>,
    #[serde(default)]
    pub referrals: Option<String>,
    #[serde(default, alias = "roleDetails")]
    pub role_details: Option<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

/// Partial update. Missing fields are left alone; `null` clears an optional field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateJobRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "applicationDate", deserialize_with = "nullable")]
    pub application_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, alias = "companyDescription", deserialize_with = "nullable")]
    pub company_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub referrals: Option<Option<String>>,
    #[serde(default, alias = "roleDetails", deserialize_with = "nullable")]
    pub role_details: Option<Option<String>>,
    #[serde(default)]
    pub checklist: Option<Vec<ChecklistItem>>,
}

fn check_text_fields(
    checker: &mut FieldChecker,
    url: Option<&str>,
    texts: [(&str, Option<&str>); 4],
) {
    checker.optional_max_len("url", url, MAX_URL_LEN);
    checker.url("url", url);
    for (field, value) in texts {
        checker.optional_max_len(field, value, MAX_TEXT_LEN);
    }
}

fn check_checklist(checker: &mut FieldChecker, checklist: &[ChecklistItem]) {
    if checklist.len() > MAX_CHECKLIST_ITEMS {
        checker.add(
            "checklist",
            format!("must have at most {MAX_CHECKLIST_ITEMS} items"),
        );
    }
    if checklist.iter().any(|item| item.text.trim().is_empty()) {
        checker.add("checklist", "items must have text");
    }
}

impl Validate for CreateJobRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.required("title", &self.title);
        checker.max_len("title", &self.title, MAX_TITLE_LEN);
        checker.required("company", &self.company);
        checker.max_len("company", &self.company, MAX_TITLE_LEN);
        check_text_fields(
            &mut checker,
            self.url.as_deref(),
            [
                ("notes", self.notes.as_deref()),
                ("company_description", self.company_description.as_deref()),
                ("referrals", self.referrals.as_deref()),
                ("role_details", self.role_details.as_deref()),
            ],
        );
        check_checklist(&mut checker, &self.checklist);
        checker.finish()
    }
}

impl Validate for UpdateJobRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        if let Some(title) = &self.title {
            checker.required("title", title);
            checker.max_len("title", title, MAX_TITLE_LEN);
        }
        if let Some(company) = &self.company {
            checker.required("company", company);
            checker.max_len("company", company, MAX_TITLE_LEN);
        }
        if let Some(status) = &self.status {
            checker.required("status", status);
        }
        check_text_fields(
            &mut checker,
            inner(&self.url),
            [
                ("notes", inner(&self.notes)),
                ("company_description", inner(&self.company_description)),
                ("referrals", inner(&self.referrals)),
                ("role_details", inner(&self.role_details)),
            ],
        );
        if let Some(checklist) = &self.checklist {
            check_checklist(&mut checker, checklist);
        }
        checker.finish()
    }
}

fn inner(field: &Option<Option<String>>) -> Option<&str> {
    field.as_ref().and_then(|v| v.as_deref())
}

/// Empty strings are stored as absent.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl UpdateJobRequest {
    /// Applies the patch on top of the stored fields. `status` is handled by the caller.
    fn apply(self, draft: &mut JobDraft) {
        if let Some(title) = self.title {
            draft.title = title.trim().to_string();
        }
        if let Some(company) = self.company {
            draft.company = company.trim().to_string();
        }
        if let Some(date) = self.application_date {
            draft.application_date = date;
        }
        if let Some(deadline) = self.deadline {
            draft.deadline = deadline;
        }
        if let Some(url) = self.url {
            draft.url = clean(url);
        }
        if let Some(notes) = self.notes {
            draft.notes = clean(notes);
        }
        if let Some(description) = self.company_description {
            draft.company_description = clean(description);
        }
        if let Some(referrals) = self.referrals {
            draft.referrals = clean(referrals);
        }
        if let Some(details) = self.role_details {
            draft.role_details = clean(details);
        }
        if let Some(checklist) = self.checklist {
            draft.checklist = checklist;
        }
    }
}

async fn owned_job(state: &AppState, principal: &Principal, id: i64) -> Result<JobRow, AppError> {
    let job = state.jobs.get_job(id).await?;
    ensure_owner(job, |j| j.user_id, principal, "Job", id)
}

/// GET /api/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<JobRow>>, AppError> {
    Ok(Json(state.jobs.list_jobs(principal.user_id).await?))
}

/// GET /api/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<JobRow>, AppError> {
    Ok(Json(owned_job(&state, &principal, id).await?))
}

/// POST /api/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidJson(req): ValidJson<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobRow>), AppError> {
    let catalog = load_catalog(&state, principal.user_id).await?;
    let status = catalog.require(req.status.as_deref().unwrap_or(SAVED))?;
    check_transition(None, &status, true)?;

    let draft = JobDraft {
        title: req.title.trim().to_string(),
        company: req.company.trim().to_string(),
        status,
        application_date: req.application_date,
        deadline: req.deadline,
        url: clean(req.url),
        notes: clean(req.notes),
        company_description: clean(req.company_description),
        referrals: clean(req.referrals),
        role_details: clean(req.role_details),
        checklist: req.checklist,
    };
    let job = state.jobs.create_job(principal.user_id, draft).await?;
    info!(user_id = principal.user_id, job_id = job.id, status = %job.status, "Job created");
    Ok((StatusCode::CREATED, Json(job)))
}

/// PUT /api/jobs/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
    ValidJson(mut req): ValidJson<UpdateJobRequest>,
) -> Result<Json<JobRow>, AppError> {
    let existing = owned_job(&state, &principal, id).await?;
    let mut draft = JobDraft::from_row(&existing);

    if let Some(requested) = req.status.take() {
        let catalog = load_catalog(&state, principal.user_id).await?;
        let status = catalog.require(&requested)?;
        check_transition(Some(existing.status.as_str()), &status, false)?;
        draft.status = status;
    }
    req.apply(&mut draft);

    let job = state.jobs.update_job(principal.user_id, id, draft).await?;
    if job.status != existing.status {
        info!(
            user_id = principal.user_id,
            job_id = id,
            from = %existing.status,
            to = %job.status,
            "Job status changed"
        );
    }
    Ok(Json(job))
}

/// DELETE /api/jobs/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    owned_job(&state, &principal, id).await?;
    if !state.jobs.delete_job(principal.user_id, id).await? {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    info!(user_id = principal.user_id, job_id = id, "Job deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct JobStatusesResponse {
    pub current: String,
    pub statuses: Vec<String>,
}

/// GET /api/jobs/:id/statuses
pub async fn handle_job_statuses(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<JobStatusesResponse>, AppError> {
    let job = owned_job(&state, &principal, id).await?;
    let catalog = load_catalog(&state, principal.user_id).await?;
    Ok(Json(JobStatusesResponse {
        statuses: selectable_statuses(Some(job.status.as_str()), &catalog),
        current: job.status,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusCatalogResponse {
    pub statuses: Vec<String>,
    pub custom: Vec<String>,
    pub max_custom: usize,
    /// Statuses a new job may start in.
    pub initial: Vec<String>,
}

/// GET /api/statuses
pub async fn handle_list_statuses(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<StatusCatalogResponse>, AppError> {
    let catalog = load_catalog(&state, principal.user_id).await?;
    Ok(Json(StatusCatalogResponse {
        statuses: catalog.labels().map(str::to_string).collect(),
        custom: catalog.custom().to_vec(),
        max_custom: catalog.max_custom(),
        initial: selectable_statuses(None, &catalog),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddStatusRequest {
    pub label: String,
}

impl Validate for AddStatusRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut checker = FieldChecker::new();
        checker.required("label", &self.label);
        checker.finish()
    }
}

/// POST /api/statuses
///
/// 201 when the label is new, 200 when an existing label is re-selected.
pub async fn handle_add_status(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidJson(req): ValidJson<AddStatusRequest>,
) -> Result<(StatusCode, Json<AddOutcome>), AppError> {
    let outcome = state
        .jobs
        .add_custom_status(principal.user_id, &req.label, state.config.max_custom_statuses)
        .await?;
    let status = match &outcome {
        AddOutcome::Added(label) => {
            info!(user_id = principal.user_id, label = %label, "Custom status added");
            StatusCode::CREATED
        }
        AddOutcome::Existing(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
