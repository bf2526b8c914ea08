pub mod handlers;
pub mod status;

use crate::errors::AppError;
use crate::state::AppState;
use status::StatusCatalog;

/// The base statuses plus the user's custom labels.
pub async fn load_catalog(state: &AppState, user_id: i64) -> Result<StatusCatalog, AppError> {
    let custom = state.jobs.list_custom_statuses(user_id).await?;
    Ok(StatusCatalog::new(custom, state.config.max_custom_statuses))
}
