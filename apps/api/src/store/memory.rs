//! In-memory implementation of every store trait.
//!
//! All tables live behind one `RwLock`, so each operation (including the
//! check-then-write of a status transition) is atomic with respect to every
//! other. Used when `DATABASE_URL` is unset and by the router tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::jobs::status::{check_transition, AddOutcome, StatusCatalog};
use crate::models::cover_letter::{CoverLetterDraft, CoverLetterRow};
use crate::models::job::{JobDraft, JobRow};
use crate::models::resume::{ResumeDraft, ResumeRow};
use crate::models::user::{NewCredential, NewUser, OAuthProviderKind, User};
use crate::store::{DocumentStore, IdentityStore, JobStore};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    jobs: BTreeMap<i64, JobRow>,
    custom_statuses: BTreeMap<i64, Vec<String>>,
    resumes: BTreeMap<i64, ResumeRow>,
    cover_letters: BTreeMap<i64, CoverLetterRow>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::DuplicateEmail);
        }
        let now = Utc::now();
        let id = tables.allocate_id();
        let mut user = User {
            id,
            email: new_user.email,
            password_hash: None,
            display_name: new_user.display_name,
            role: new_user.role,
            google_id: None,
            apple_id: None,
            microsoft_id: None,
            created_at: now,
            updated_at: now,
        };
        match new_user.credential {
            NewCredential::PasswordHash(hash) => user.password_hash = Some(hash),
            NewCredential::OAuth {
                provider,
                provider_id,
            } => set_provider_id(&mut user, provider, provider_id),
        }
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn link_provider(
        &self,
        user_id: i64,
        provider: OAuthProviderKind,
        provider_id: &str,
    ) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
        set_provider_id(user, provider, provider_id.to_string());
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.jobs.retain(|_, job| job.user_id != id);
        tables.custom_statuses.remove(&id);
        tables.resumes.retain(|_, resume| resume.user_id != id);
        tables.cover_letters.retain(|_, letter| letter.user_id != id);
        Ok(true)
    }
}

fn set_provider_id(user: &mut User, provider: OAuthProviderKind, provider_id: String) {
    match provider {
        OAuthProviderKind::Google => user.google_id = Some(provider_id),
        OAuthProviderKind::Apple => user.apple_id = Some(provider_id),
        OAuthProviderKind::Microsoft => user.microsoft_id = Some(provider_id),
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn list_jobs(&self, user_id: i64) -> Result<Vec<JobRow>, AppError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<JobRow> = tables
            .jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn get_job(&self, id: i64) -> Result<Option<JobRow>, AppError> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn create_job(&self, user_id: i64, draft: JobDraft) -> Result<JobRow, AppError> {
        check_transition(None, &draft.status, true)?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let id = tables.allocate_id();
        let job = job_row(id, user_id, draft, now, now);
        tables.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn update_job(&self, user_id: i64, id: i64, draft: JobDraft) -> Result<JobRow, AppError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .jobs
            .get(&id)
            .filter(|job| job.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
        check_transition(Some(existing.status.as_str()), &draft.status, false)?;
        let job = job_row(id, user_id, draft, existing.created_at, Utc::now());
        tables.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn delete_job(&self, user_id: i64, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let owned = tables.jobs.get(&id).is_some_and(|job| job.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        tables.jobs.remove(&id);
        for resume in tables.resumes.values_mut() {
            if resume.job_id == Some(id) {
                resume.job_id = None;
            }
        }
        for letter in tables.cover_letters.values_mut() {
            if letter.job_id == Some(id) {
                letter.job_id = None;
            }
        }
        Ok(true)
    }

    async fn list_custom_statuses(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .custom_statuses
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_custom_status(
        &self,
        user_id: i64,
        label: &str,
        max_custom: usize,
    ) -> Result<AddOutcome, AppError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .custom_statuses
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        let mut catalog = StatusCatalog::new(existing, max_custom);
        let outcome = catalog.add_custom(label)?;
        if let AddOutcome::Added(_) = outcome {
            tables
                .custom_statuses
                .insert(user_id, catalog.custom().to_vec());
        }
        Ok(outcome)
    }
}

fn job_row(
    id: i64,
    user_id: i64,
    draft: JobDraft,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> JobRow {
    JobRow {
        id,
        user_id,
        title: draft.title,
        company: draft.company,
        status: draft.status,
        application_date: draft.application_date,
        deadline: draft.deadline,
        url: draft.url,
        notes: draft.notes,
        company_description: draft.company_description,
        referrals: draft.referrals,
        role_details: draft.role_details,
        checklist: Json(draft.checklist),
        created_at,
        updated_at,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_resumes(&self, user_id: i64) -> Result<Vec<ResumeRow>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .resumes
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_resume(&self, id: i64) -> Result<Option<ResumeRow>, AppError> {
        Ok(self.tables.read().await.resumes.get(&id).cloned())
    }

    async fn create_resume(&self, user_id: i64, draft: ResumeDraft) -> Result<ResumeRow, AppError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let id = tables.allocate_id();
        let resume = resume_row(id, user_id, draft, now, now);
        tables.resumes.insert(id, resume.clone());
        Ok(resume)
    }

    async fn update_resume(
        &self,
        user_id: i64,
        id: i64,
        draft: ResumeDraft,
    ) -> Result<Option<ResumeRow>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.resumes.get(&id).filter(|r| r.user_id == user_id) else {
            return Ok(None);
        };
        let resume = resume_row(id, user_id, draft, existing.created_at, Utc::now());
        tables.resumes.insert(id, resume.clone());
        Ok(Some(resume))
    }

    async fn delete_resume(&self, user_id: i64, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let owned = tables.resumes.get(&id).is_some_and(|r| r.user_id == user_id);
        if owned {
            tables.resumes.remove(&id);
        }
        Ok(owned)
    }

    async fn list_cover_letters(&self, user_id: i64) -> Result<Vec<CoverLetterRow>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .cover_letters
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_cover_letter(&self, id: i64) -> Result<Option<CoverLetterRow>, AppError> {
        Ok(self.tables.read().await.cover_letters.get(&id).cloned())
    }

    async fn create_cover_letter(
        &self,
        user_id: i64,
        draft: CoverLetterDraft,
    ) -> Result<CoverLetterRow, AppError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let id = tables.allocate_id();
        let letter = cover_letter_row(id, user_id, draft, now, now);
        tables.cover_letters.insert(id, letter.clone());
        Ok(letter)
    }

    async fn update_cover_letter(
        &self,
        user_id: i64,
        id: i64,
        draft: CoverLetterDraft,
    ) -> Result<Option<CoverLetterRow>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables
            .cover_letters
            .get(&id)
            .filter(|c| c.user_id == user_id)
        else {
            return Ok(None);
        };
        let letter = cover_letter_row(id, user_id, draft, existing.created_at, Utc::now());
        tables.cover_letters.insert(id, letter.clone());
        Ok(Some(letter))
    }

    async fn delete_cover_letter(&self, user_id: i64, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .cover_letters
            .get(&id)
            .is_some_and(|c| c.user_id == user_id);
        if owned {
            tables.cover_letters.remove(&id);
        }
        Ok(owned)
    }
}

fn resume_row(
    id: i64,
    user_id: i64,
    draft: ResumeDraft,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> ResumeRow {
    let sections = draft.sections;
    ResumeRow {
        id,
        user_id,
        job_id: draft.job_id,
        title: draft.title,
        summary: sections.summary,
        experience: Json(sections.experience),
        education: Json(sections.education),
        skills: Json(sections.skills),
        projects: Json(sections.projects),
        achievements: Json(sections.achievements),
        created_at,
        updated_at,
    }
}

fn cover_letter_row(
    id: i64,
    user_id: i64,
    draft: CoverLetterDraft,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> CoverLetterRow {
    CoverLetterRow {
        id,
        user_id,
        job_id: draft.job_id,
        title: draft.title,
        content: draft.content,
        job_title: draft.job_title,
        company_name: draft.company_name,
        job_description: draft.job_description,
        created_at,
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::status::{APPLIED, REJECTED, SAVED};
    use crate::models::resume::ResumeSections;
    use crate::models::user::Role;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            display_name: "Test".to_string(),
            role: Role::User,
            credential: NewCredential::PasswordHash("$2b$04$hash".to_string()),
        }
    }

    fn draft(status: &str) -> JobDraft {
        JobDraft {
            title: "SWE".to_string(),
            company: "Acme".to_string(),
            status: status.to_string(),
            application_date: None,
            deadline: None,
            url: None,
            notes: None,
            company_description: None,
            referrals: None,
            role_details: None,
            checklist: vec![],
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_creates_no_record() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();
        let err = store.create_user(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(store.tables.read().await.users.len(), 1);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_sensitive() {
        let store = MemoryStore::new();
        store.create_user(new_user("Alice@example.com")).await.unwrap();
        assert!(store.find_by_email("alice@example.com").await.unwrap().is_none());
        assert!(store.find_by_email("Alice@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_link_provider_keeps_password_hash() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let linked = store
            .link_provider(user.id, OAuthProviderKind::Google, "g-123")
            .await
            .unwrap();
        assert_eq!(linked.google_id.as_deref(), Some("g-123"));
        assert_eq!(linked.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn test_create_rejected_job_is_refused() {
        let store = MemoryStore::new();
        let err = store.create_job(1, draft(REJECTED)).await.unwrap_err();
        assert!(matches!(err, AppError::TerminalOnCreate(_)));
        assert!(store.list_jobs(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_out_of_rejected_is_refused_and_status_kept() {
        let store = MemoryStore::new();
        let job = store.create_job(1, draft(SAVED)).await.unwrap();
        store.update_job(1, job.id, draft(REJECTED)).await.unwrap();
        let err = store.update_job(1, job.id, draft(APPLIED)).await.unwrap_err();
        assert!(matches!(err, AppError::TerminalStateViolation { .. }));
        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, REJECTED);
    }

    #[tokio::test]
    async fn test_update_by_other_user_is_not_found() {
        let store = MemoryStore::new();
        let job = store.create_job(1, draft(SAVED)).await.unwrap();
        let err = store.update_job(2, job.id, draft(APPLIED)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!store.delete_job(2, job.id).await.unwrap());
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().status, SAVED);
    }

    #[tokio::test]
    async fn test_delete_job_unlinks_documents() {
        let store = MemoryStore::new();
        let job = store.create_job(1, draft(SAVED)).await.unwrap();
        let resume = store
            .create_resume(
                1,
                ResumeDraft {
                    job_id: Some(job.id),
                    title: "Main".to_string(),
                    sections: ResumeSections::default(),
                },
            )
            .await
            .unwrap();
        assert!(store.delete_job(1, job.id).await.unwrap());
        let resume = store.get_resume(resume.id).await.unwrap().unwrap();
        assert_eq!(resume.job_id, None);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        store.create_job(user.id, draft(SAVED)).await.unwrap();
        store
            .add_custom_status(user.id, "Phone Screen", 20)
            .await
            .unwrap();
        assert!(store.delete_user(user.id).await.unwrap());
        assert!(store.list_jobs(user.id).await.unwrap().is_empty());
        assert!(store.list_custom_statuses(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_status_limit_is_per_user() {
        let store = MemoryStore::new();
        store.add_custom_status(1, "One", 1).await.unwrap();
        assert!(matches!(
            store.add_custom_status(1, "Two", 1).await,
            Err(AppError::StatusLimitExceeded { max: 1 })
        ));
        assert_eq!(
            store.add_custom_status(2, "Two", 1).await.unwrap(),
            AddOutcome::Added("Two".to_string())
        );
        assert_eq!(store.list_custom_statuses(1).await.unwrap(), vec!["One"]);
    }
}
