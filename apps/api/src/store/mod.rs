//! Persistence seams.
//!
//! Handlers never talk to sqlx directly; they go through these traits so the
//! same code runs against Postgres in production and against `MemoryStore` in
//! tests and local development. `AppState` carries each as an `Arc<dyn ...>`.
//!
//! Reads by id are deliberately unscoped: the caller runs the ownership check
//! (`auth::ensure_owner`). Mutations take the caller's `user_id` and only touch
//! rows that user owns.

use async_trait::async_trait;

use crate::errors::AppError;
use crate::jobs::status::AddOutcome;
use crate::models::cover_letter::{CoverLetterDraft, CoverLetterRow};
use crate::models::job::{JobDraft, JobRow};
use crate::models::resume::{ResumeDraft, ResumeRow};
use crate::models::user::{NewUser, OAuthProviderKind, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with `AppError::DuplicateEmail` if the email is taken, whatever the signup method.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Records an OAuth provider id on an existing account. Leaves the password hash alone.
    async fn link_provider(
        &self,
        user_id: i64,
        provider: OAuthProviderKind,
        provider_id: &str,
    ) -> Result<User, AppError>;

    /// Removes the account and, by cascade, everything it owns.
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list_jobs(&self, user_id: i64) -> Result<Vec<JobRow>, AppError>;

    async fn get_job(&self, id: i64) -> Result<Option<JobRow>, AppError>;

    /// The draft's status must already be canonical and checked with `can_transition`.
    async fn create_job(&self, user_id: i64, draft: JobDraft) -> Result<JobRow, AppError>;

    /// Replaces the job's fields. The status transition is re-checked against the
    /// stored status while the row is locked, so a concurrent writer cannot move a
    /// job out of a terminal status.
    async fn update_job(&self, user_id: i64, id: i64, draft: JobDraft) -> Result<JobRow, AppError>;

    /// Deletes the job and unlinks resumes and cover letters pointing at it.
    async fn delete_job(&self, user_id: i64, id: i64) -> Result<bool, AppError>;

    async fn list_custom_statuses(&self, user_id: i64) -> Result<Vec<String>, AppError>;

    /// Adds a custom status label for the user, serialised per user so the
    /// limit check and the insert cannot interleave.
    async fn add_custom_status(
        &self,
        user_id: i64,
        label: &str,
        max_custom: usize,
    ) -> Result<AddOutcome, AppError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_resumes(&self, user_id: i64) -> Result<Vec<ResumeRow>, AppError>;

    async fn get_resume(&self, id: i64) -> Result<Option<ResumeRow>, AppError>;

    async fn create_resume(&self, user_id: i64, draft: ResumeDraft) -> Result<ResumeRow, AppError>;

    async fn update_resume(
        &self,
        user_id: i64,
        id: i64,
        draft: ResumeDraft,
    ) -> Result<Option<ResumeRow>, AppError>;

    async fn delete_resume(&self, user_id: i64, id: i64) -> Result<bool, AppError>;

    async fn list_cover_letters(&self, user_id: i64) -> Result<Vec<CoverLetterRow>, AppError>;

    async fn get_cover_letter(&self, id: i64) -> Result<Option<CoverLetterRow>, AppError>;

    async fn create_cover_letter(
        &self,
        user_id: i64,
        draft: CoverLetterDraft,
    ) -> Result<CoverLetterRow, AppError>;

    async fn update_cover_letter(
        &self,
        user_id: i64,
        id: i64,
        draft: CoverLetterDraft,
    ) -> Result<Option<CoverLetterRow>, AppError>;

    async fn delete_cover_letter(&self, user_id: i64, id: i64) -> Result<bool, AppError>;
}
