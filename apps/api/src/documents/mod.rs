//! Resumes and cover letters. Both may point at one of the owner's jobs.

pub mod cover_letters;
pub mod resumes;

use crate::auth::{ensure_owner, Principal};
use crate::errors::AppError;
use crate::models::job::JobRow;
use crate::state::AppState;

/// Loads the job a document is being linked to. Someone else's job is reported
/// as missing, exactly like in the job routes.
pub async fn linked_job(
    state: &AppState,
    principal: &Principal,
    job_id: Option<i64>,
) -> Result<Option<JobRow>, AppError> {
    let Some(job_id) = job_id else {
        return Ok(None);
    };
    let job = state.jobs.get_job(job_id).await?;
    ensure_owner(job, |j| j.user_id, principal, "Job", job_id).map(Some)
}
