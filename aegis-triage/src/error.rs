use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::stage::StageKind;
use crate::validator::{FieldIssue, describe_issues};

/// Rendering a prompt template failed. Always a caller or configuration bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template {template} has no value bound for placeholder {{{placeholder}}}")]
    MissingBinding {
        template: String,
        placeholder: String,
    },

    #[error("template {template} does not reference its placeholder {{{placeholder}}}")]
    UnusedPlaceholder {
        template: String,
        placeholder: String,
    },
}

/// Model output did not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response does not contain a JSON object")]
    NoJson,

    #[error("response is not valid JSON: {0}")]
    Malformed(String),

    #[error("{}", describe_issues(.0))]
    Fields(Vec<FieldIssue>),
}

impl ValidationError {
    /// Bullet list used in repair prompts.
    pub fn as_bullets(&self) -> String {
        match self {
            ValidationError::Fields(issues) => issues
                .iter()
                .map(|issue| format!("- {issue}"))
                .collect::<Vec<_>>()
                .join("\n"),
            other => format!("- {other}"),
        }
    }
}

/// The model could not be reached or did not answer in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl InvocationError {
    /// Errors worth retrying with backoff inside one attempt. Timeouts are
    /// excluded: they consume a stage attempt instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Template,
    Validation,
    Invocation,
}

/// Terminal failure of one stage after its repair budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{stage} stage failed after {repair_attempts} attempt(s): {reason}")]
pub struct StageFailure {
    pub stage: StageKind,
    pub kind: FailureKind,
    /// Model invocations made for the stage, the first one included.
    pub repair_attempts: u32,
    /// Display form of the last error.
    pub reason: String,
    /// Last raw model reply, when one was received.
    pub raw_output: Option<String>,
}

impl StageFailure {
    pub fn template(stage: StageKind, attempts: u32, err: &TemplateError) -> Self {
        Self {
            stage,
            kind: FailureKind::Template,
            repair_attempts: attempts,
            reason: err.to_string(),
            raw_output: None,
        }
    }

    pub fn validation(
        stage: StageKind,
        attempts: u32,
        err: &ValidationError,
        raw_output: String,
    ) -> Self {
        Self {
            stage,
            kind: FailureKind::Validation,
            repair_attempts: attempts,
            reason: err.to_string(),
            raw_output: Some(raw_output),
        }
    }

    pub fn invocation(stage: StageKind, attempts: u32, err: &InvocationError) -> Self {
        Self {
            stage,
            kind: FailureKind::Invocation,
            repair_attempts: attempts,
            reason: err.to_string(),
            raw_output: None,
        }
    }
}

/// Why a pipeline run ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum PipelineFailure {
    #[error(transparent)]
    Stage(StageFailure),

    /// The orchestration engine itself misbehaved; no stage is to blame.
    #[error("pipeline engine error: {message}")]
    Engine { message: String },
}

impl PipelineFailure {
    pub fn stage_failure(&self) -> Option<&StageFailure> {
        match self {
            PipelineFailure::Stage(failure) => Some(failure),
            PipelineFailure::Engine { .. } => None,
        }
    }
}
