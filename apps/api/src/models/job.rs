use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default, alias = "isChecked")]
    pub is_checked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub company: String,
    pub status: String,
    pub application_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub company_description: Option<String>,
    pub referrals: Option<String>,
    pub role_details: Option<String>,
    pub checklist: Json<Vec<ChecklistItem>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated, status-canonicalised job fields ready for persistence.
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub title: String,
    pub company: String,
    pub status: String,
    pub application_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub company_description: Option<String>,
    pub referrals: Option<String>,
    pub role_details: Option<String>,
    pub checklist: Vec<ChecklistItem>,
}

impl JobDraft {
    /// Full-replacement draft seeded from the stored row, used to apply partial updates.
    pub fn from_row(row: &JobRow) -> Self {
        JobDraft {
            title: row.title.clone(),
            company: row.company.clone(),
            status: row.status.clone(),
            application_date: row.application_date,
            deadline: row.deadline,
            url: row.url.clone(),
            notes: row.notes.clone(),
            company_description: row.company_description.clone(),
            referrals: row.referrals.clone(),
            role_details: row.role_details.clone(),
            checklist: row.checklist.0.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomStatusRow {
    pub user_id: i64,
    pub label: String,
    pub created_at: DateTime<Utc>,
}
