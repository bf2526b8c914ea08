use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CoverLetterRow {
    pub id: i64,
    pub user_id: i64,
    pub job_id: Option<i64>,
    pub title: String,
    pub content: String,
    /// Snapshot of the linked job at the time of writing; survives the job being deleted.
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CoverLetterDraft {
    pub job_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
}
