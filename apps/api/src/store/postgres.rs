use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use crate::errors::AppError;
use crate::jobs::status::{check_transition, AddOutcome, StatusCatalog};
use crate::models::cover_letter::{CoverLetterDraft, CoverLetterRow};
use crate::models::job::{JobDraft, JobRow};
use crate::models::resume::{ResumeDraft, ResumeRow};
use crate::models::user::{NewCredential, NewUser, OAuthProviderKind, User};
use crate::store::{DocumentStore, IdentityStore, JobStore};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a unique violation on the email index to `DuplicateEmail`.
fn map_user_insert_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some("users_email_key") {
            return AppError::DuplicateEmail;
        }
    }
    AppError::Database(err)
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let (password_hash, provider) = match new_user.credential {
            NewCredential::PasswordHash(hash) => (Some(hash), None),
            NewCredential::OAuth {
                provider,
                provider_id,
            } => (None, Some((provider, provider_id))),
        };
        let provider_id_for = |kind: OAuthProviderKind| {
            provider
                .as_ref()
                .filter(|(p, _)| *p == kind)
                .map(|(_, id)| id.clone())
        };

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users
                (email, password_hash, display_name, role, google_id, apple_id, microsoft_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new_user.email)
        .bind(password_hash)
        .bind(&new_user.display_name)
        .bind(new_user.role)
        .bind(provider_id_for(OAuthProviderKind::Google))
        .bind(provider_id_for(OAuthProviderKind::Apple))
        .bind(provider_id_for(OAuthProviderKind::Microsoft))
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_insert_error)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn link_provider(
        &self,
        user_id: i64,
        provider: OAuthProviderKind,
        provider_id: &str,
    ) -> Result<User, AppError> {
        // Column names come from a closed enum, never from input.
        let column = match provider {
            OAuthProviderKind::Google => "google_id",
            OAuthProviderKind::Apple => "apple_id",
            OAuthProviderKind::Microsoft => "microsoft_id",
        };
        let sql =
            format!("UPDATE users SET {column} = $1, updated_at = now() WHERE id = $2 RETURNING *");
        sqlx::query_as::<_, User>(&sql)
            .bind(provider_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn list_jobs(&self, user_id: i64) -> Result<Vec<JobRow>, AppError> {
        Ok(sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_job(&self, id: i64) -> Result<Option<JobRow>, AppError> {
        Ok(sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_job(&self, user_id: i64, draft: JobDraft) -> Result<JobRow, AppError> {
        check_transition(None, &draft.status, true)?;
        Ok(sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs
                (user_id, title, company, status, application_date, deadline, url, notes,
                 company_description, referrals, role_details, checklist)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&draft.title)
        .bind(&draft.company)
        .bind(&draft.status)
        .bind(draft.application_date)
        .bind(draft.deadline)
        .bind(&draft.url)
        .bind(&draft.notes)
        .bind(&draft.company_description)
        .bind(&draft.referrals)
        .bind(&draft.role_details)
        .bind(Json(&draft.checklist))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_job(&self, user_id: i64, id: i64, draft: JobDraft) -> Result<JobRow, AppError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT status FROM jobs WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let current = current.ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;

        // Dropping `tx` on the error path rolls back and releases the row lock.
        check_transition(Some(current.as_str()), &draft.status, false)?;

        let job = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs SET
                title = $3, company = $4, status = $5, application_date = $6, deadline = $7,
                url = $8, notes = $9, company_description = $10, referrals = $11,
                role_details = $12, checklist = $13, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&draft.title)
        .bind(&draft.company)
        .bind(&draft.status)
        .bind(draft.application_date)
        .bind(draft.deadline)
        .bind(&draft.url)
        .bind(&draft.notes)
        .bind(&draft.company_description)
        .bind(&draft.referrals)
        .bind(&draft.role_details)
        .bind(Json(&draft.checklist))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Job {id} now in status {}", job.status);
        Ok(job)
    }

    async fn delete_job(&self, user_id: i64, id: i64) -> Result<bool, AppError> {
        // resumes.job_id and cover_letters.job_id are ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_custom_statuses(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT label FROM custom_statuses WHERE user_id = $1 ORDER BY created_at, label",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_custom_status(
        &self,
        user_id: i64,
        label: &str,
        max_custom: usize,
    ) -> Result<AddOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serialise catalog edits per user on the owning row.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT label FROM custom_statuses WHERE user_id = $1 ORDER BY created_at, label",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut catalog = StatusCatalog::new(existing, max_custom);
        let outcome = catalog.add_custom(label)?;

        if let AddOutcome::Added(label) = &outcome {
            sqlx::query("INSERT INTO custom_statuses (user_id, label) VALUES ($1, $2)")
                .bind(user_id)
                .bind(label)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn list_resumes(&self, user_id: i64) -> Result<Vec<ResumeRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_resume(&self, id: i64) -> Result<Option<ResumeRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_resume(&self, user_id: i64, draft: ResumeDraft) -> Result<ResumeRow, AppError> {
        let s = &draft.sections;
        Ok(sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resumes
                (user_id, job_id, title, summary, experience, education, skills, projects, achievements)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(draft.job_id)
        .bind(&draft.title)
        .bind(&s.summary)
        .bind(Json(&s.experience))
        .bind(Json(&s.education))
        .bind(Json(&s.skills))
        .bind(Json(&s.projects))
        .bind(Json(&s.achievements))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_resume(
        &self,
        user_id: i64,
        id: i64,
        draft: ResumeDraft,
    ) -> Result<Option<ResumeRow>, AppError> {
        let s = &draft.sections;
        Ok(sqlx::query_as::<_, ResumeRow>(
            r#"
            UPDATE resumes SET
                job_id = $3, title = $4, summary = $5, experience = $6, education = $7,
                skills = $8, projects = $9, achievements = $10, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(draft.job_id)
        .bind(&draft.title)
        .bind(&s.summary)
        .bind(Json(&s.experience))
        .bind(Json(&s.education))
        .bind(Json(&s.skills))
        .bind(Json(&s.projects))
        .bind(Json(&s.achievements))
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_resume(&self, user_id: i64, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_cover_letters(&self, user_id: i64) -> Result<Vec<CoverLetterRow>, AppError> {
        Ok(sqlx::query_as::<_, CoverLetterRow>(
            "SELECT * FROM cover_letters WHERE user_id = $1 ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_cover_letter(&self, id: i64) -> Result<Option<CoverLetterRow>, AppError> {
        Ok(
            sqlx::query_as::<_, CoverLetterRow>("SELECT * FROM cover_letters WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_cover_letter(
        &self,
        user_id: i64,
        draft: CoverLetterDraft,
    ) -> Result<CoverLetterRow, AppError> {
        Ok(sqlx::query_as::<_, CoverLetterRow>(
            r#"
            INSERT INTO cover_letters
                (user_id, job_id, title, content, job_title, company_name, job_description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(draft.job_id)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(&draft.job_title)
        .bind(&draft.company_name)
        .bind(&draft.job_description)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_cover_letter(
        &self,
        user_id: i64,
        id: i64,
        draft: CoverLetterDraft,
    ) -> Result<Option<CoverLetterRow>, AppError> {
        Ok(sqlx::query_as::<_, CoverLetterRow>(
            r#"
            UPDATE cover_letters SET
                job_id = $3, title = $4, content = $5, job_title = $6, company_name = $7,
                job_description = $8, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(draft.job_id)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(&draft.job_title)
        .bind(&draft.company_name)
        .bind(&draft.job_description)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_cover_letter(&self, user_id: i64, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM cover_letters WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
