//! Request-body schema validation.
//!
//! Handlers take `ValidJson<T>` instead of `Json<T>`: the body is deserialized into a
//! typed request struct and then checked by its `Validate` impl. Either failure becomes
//! `AppError::Validation` before the handler body runs.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::errors::{AppError, FieldErrors};

pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation {
                message: rejection.body_text(),
                fields: FieldErrors::new(),
            })?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Collects per-field messages and turns them into a single `AppError::Validation`.
#[derive(Debug, Default)]
pub struct FieldChecker {
    fields: FieldErrors,
}

impl FieldChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "is required");
        }
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(field, format!("must be at most {max} characters"));
        }
    }

    pub fn optional_max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(value) = value {
            self.max_len(field, value, max);
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !is_plausible_email(value) {
            self.add(field, "must be a valid email address");
        }
    }

    pub fn url(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            if !is_web_url(value) {
                self.add(field, "must be an http(s) URL");
            }
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        let message = self
            .fields
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        Err(AppError::Validation {
            message,
            fields: self.fields,
        })
    }
}

/// For partial updates: a missing field stays `None`, an explicit `null` becomes
/// `Some(None)`. Use with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Accepts absolute http(s) URLs only.
pub fn is_web_url(value: &str) -> bool {
    let value = value.trim();
    (value.starts_with("https://") || value.starts_with("http://"))
        && !value.chars().any(char::is_whitespace)
        && value.len() > "https://".len()
}

/// Emails are stored and looked up as given, minus surrounding whitespace.
/// Case is significant.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_string()
}

/// Syntactic check only: one `@`, non-empty local part, dotted domain, no whitespace.
pub fn is_plausible_email(value: &str) -> bool {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausible_emails() {
        assert!(is_plausible_email("alice@example.com"));
        assert!(is_plausible_email("  bob.smith+jobs@mail.example.org "));
    }

    #[test]
    fn test_implausible_emails() {
        assert!(!is_plausible_email(""));
        assert!(!is_plausible_email("alice"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("alice@localhost"));
        assert!(!is_plausible_email("alice@@example.com"));
        assert!(!is_plausible_email("al ice@example.com"));
    }

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        notes: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_distinguishes_missing_from_null() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"notes":null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"notes":"hi"}"#).unwrap();
        assert_eq!(missing.notes, None);
        assert_eq!(null.notes, Some(None));
        assert_eq!(set.notes, Some(Some("hi".to_string())));
    }

    #[test]
    fn test_web_urls() {
        assert!(is_web_url("https://acme.example/jobs/1"));
        assert!(!is_web_url("javascript:alert(1)"));
        assert!(!is_web_url("https://"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "Alice@Example.COM");
        assert_eq!(normalize_email("\tbob@example.com\n"), "bob@example.com");
    }

    #[test]
    fn test_checker_collects_every_field() {
        let mut checker = FieldChecker::new();
        checker.required("title", " ");
        checker.required("company", "");
        checker.max_len("notes", "abcdef", 3);
        match checker.finish() {
            Err(AppError::Validation { fields, .. }) => {
                assert_eq!(fields.len(), 3);
                assert_eq!(fields["title"], vec!["is required".to_string()]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_checker_passes_when_clean() {
        let mut checker = FieldChecker::new();
        checker.required("title", "SWE");
        checker.optional_max_len("url", None, 10);
        assert!(checker.finish().is_ok());
    }
}
