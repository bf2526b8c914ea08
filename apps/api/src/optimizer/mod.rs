//! AI rewriting of resume and cover-letter text.
//!
//! `AppState` holds an `Arc<dyn ContentOptimizer>`: the model-backed optimizer
//! when `OPTIMIZER_API_KEY` is set, `UnconfiguredOptimizer` otherwise.

pub mod client;
pub mod handlers;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;
use client::{LlmClient, LlmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeKind {
    ResumeSummary,
    Experience,
    CoverLetter,
    Skills,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("content optimization is not configured")]
    NotConfigured,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Every model failure is surfaced as retryable; only a missing configuration is not.
impl From<OptimizerError> for AppError {
    fn from(err: OptimizerError) -> Self {
        let retryable = !matches!(err, OptimizerError::NotConfigured);
        AppError::Upstream {
            message: err.to_string(),
            retryable,
        }
    }
}

#[async_trait]
pub trait ContentOptimizer: Send + Sync {
    async fn optimize(
        &self,
        kind: OptimizeKind,
        content: &str,
        job_description: Option<&str>,
    ) -> Result<String, OptimizerError>;
}

pub struct LlmOptimizer(pub LlmClient);

#[async_trait]
impl ContentOptimizer for LlmOptimizer {
    async fn optimize(
        &self,
        kind: OptimizeKind,
        content: &str,
        job_description: Option<&str>,
    ) -> Result<String, OptimizerError> {
        let prompt = prompts::build_prompt(kind, content, job_description);
        Ok(self.0.complete(&prompt, prompts::SYSTEM).await?)
    }
}

pub struct UnconfiguredOptimizer;

#[async_trait]
impl ContentOptimizer for UnconfiguredOptimizer {
    async fn optimize(
        &self,
        _kind: OptimizeKind,
        _content: &str,
        _job_description: Option<&str>,
    ) -> Result<String, OptimizerError> {
        Err(OptimizerError::NotConfigured)
    }
}
