//! Job status lifecycle.
//!
//! Five base statuses plus per-user custom labels. The only hard rule is that
//! `Rejected` is terminal: a job can never be created in it, and once a job is
//! rejected it stays rejected. Any other reassignment is allowed, in any order.
//!
//! `can_transition` is the single predicate used by the create path, by the
//! update write (under the store's lock), and by `selectable_statuses`, which
//! clients use to pre-filter their status pickers.

use serde::Serialize;

use crate::errors::AppError;

pub const SAVED: &str = "Saved";
pub const APPLIED: &str = "Applied";
pub const INTERVIEWING: &str = "Interviewing";
pub const OFFER: &str = "Offer";
pub const REJECTED: &str = "Rejected";

pub const BASE_STATUSES: [&str; 5] = [SAVED, APPLIED, INTERVIEWING, OFFER, REJECTED];

pub const DEFAULT_MAX_CUSTOM_STATUSES: usize = 20;
pub const MAX_LABEL_LEN: usize = 40;

pub fn is_terminal(status: &str) -> bool {
    status.eq_ignore_ascii_case(REJECTED)
}

/// Whether a job may move from `current` to `requested`.
///
/// `current` is `None` for a record that does not exist yet.
pub fn can_transition(current: Option<&str>, requested: &str, is_new: bool) -> bool {
    if is_new || current.is_none() {
        return !is_terminal(requested);
    }
    match current {
        Some(current) if is_terminal(current) => is_terminal(requested),
        _ => true,
    }
}

/// `can_transition` with the matching error for the failing case.
pub fn check_transition(
    current: Option<&str>,
    requested: &str,
    is_new: bool,
) -> Result<(), AppError> {
    if can_transition(current, requested, is_new) {
        return Ok(());
    }
    match current {
        Some(current) if !is_new => Err(AppError::TerminalStateViolation {
            current: current.to_string(),
            requested: requested.to_string(),
        }),
        _ => Err(AppError::TerminalOnCreate(requested.to_string())),
    }
}

/// Outcome of adding a custom label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "label", rename_all = "snake_case")]
pub enum AddOutcome {
    /// The label was new and has been appended.
    Added(String),
    /// A label with the same case-insensitive spelling already existed; it is re-selected.
    Existing(String),
}

impl AddOutcome {
    pub fn label(&self) -> &str {
        match self {
            AddOutcome::Added(label) | AddOutcome::Existing(label) => label,
        }
    }
}

/// The statuses known to one user: the base five followed by their custom labels.
#[derive(Debug, Clone)]
pub struct StatusCatalog {
    custom: Vec<String>,
    max_custom: usize,
}

impl StatusCatalog {
    pub fn new(custom: Vec<String>, max_custom: usize) -> Self {
        Self { custom, max_custom }
    }

    pub fn custom(&self) -> &[String] {
        &self.custom
    }

    pub fn max_custom(&self) -> usize {
        self.max_custom
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        BASE_STATUSES
            .iter()
            .copied()
            .chain(self.custom.iter().map(String::as_str))
    }

    /// Canonical spelling of `label`, matched case-insensitively with runs of
    /// whitespace collapsed the way stored labels are.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        let wanted = collapse_whitespace(label);
        self.labels().find(|known| known.eq_ignore_ascii_case(&wanted))
    }

    /// Validates and canonicalises a status supplied on a job write.
    pub fn require(&self, label: &str) -> Result<String, AppError> {
        self.resolve(label).map(str::to_string).ok_or_else(|| {
            AppError::invalid(
                "status",
                format!("unknown status '{}'; add it as a custom status first", label.trim()),
            )
        })
    }

    /// Adds a custom label unless an equivalent one exists. The catalog is left
    /// untouched on every error path.
    pub fn add_custom(&mut self, label: &str) -> Result<AddOutcome, AppError> {
        let label = normalize_label(label)?;
        if let Some(existing) = self.resolve(&label) {
            return Ok(AddOutcome::Existing(existing.to_string()));
        }
        if self.custom.len() >= self.max_custom {
            return Err(AppError::StatusLimitExceeded {
                max: self.max_custom,
            });
        }
        self.custom.push(label.clone());
        Ok(AddOutcome::Added(label))
    }
}

/// Trims and collapses inner whitespace; rejects empty and oversized labels.
fn collapse_whitespace(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_label(label: &str) -> Result<String, AppError> {
    let label = collapse_whitespace(label);
    if label.is_empty() {
        return Err(AppError::invalid("label", "is required"));
    }
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(AppError::invalid(
            "label",
            format!("must be at most {MAX_LABEL_LEN} characters"),
        ));
    }
    Ok(label)
}

/// Statuses a client may offer for a job in `current` (`None` for a new job).
pub fn selectable_statuses(current: Option<&str>, catalog: &StatusCatalog) -> Vec<String> {
    catalog
        .labels()
        .filter(|candidate| can_transition(current, candidate, current.is_none()))
        .map(str::to_string)
        .collect()
}
