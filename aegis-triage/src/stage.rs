//! Shared machinery of the stage runners: invoke the model, validate the
//! reply, and re-prompt with corrective instructions until the attempt budget
//! is spent.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{InvocationError, StageFailure, ValidationError};
use crate::invoker::{GenerationConfig, ModelInvoker};
use crate::retry::{RetryPolicy, with_backoff};
use crate::template::{Bindings, PromptTemplate};
use crate::validator::{FieldIssue, Shape, validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Diagnosis,
    Critic,
    #[serde(rename = "Genomic-Precision")]
    GenomicPrecision,
    Refinement,
    Triage,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Diagnosis => "Diagnosis",
            StageKind::Critic => "Critic",
            StageKind::GenomicPrecision => "Genomic-Precision",
            StageKind::Refinement => "Refinement",
            StageKind::Triage => "Triage",
        }
    }

    /// Phrase that identifies the built-in prompt of this stage.
    pub fn builtin_marker(&self) -> &'static str {
        match self {
            StageKind::Diagnosis => "diagnostic reasoning agent",
            StageKind::Critic => "quality assurance agent",
            StageKind::GenomicPrecision => "pharmacogenomics precision agent",
            StageKind::Refinement => "synthesising the work of several clinical reasoning agents",
            StageKind::Triage => "emergency medicine triage agent",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-specific rules checked after the shape, e.g. coverage of every
/// proposed medication.
pub type Rules<'a, T> = &'a (dyn Fn(&T) -> Vec<FieldIssue> + Send + Sync);

/// Invokes the model for one stage and enforces the repair policy.
pub struct StageRunner {
    invoker: Arc<dyn ModelInvoker>,
    repair: PromptTemplate,
    policy: RetryPolicy,
    timeout: Duration,
}

impl StageRunner {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        repair: PromptTemplate,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            repair,
            policy,
            timeout,
        }
    }

    async fn invoke(&self, prompt: &str, generation: &GenerationConfig) -> Result<String, InvocationError> {
        with_backoff(&self.policy, move || async move {
            match tokio::time::timeout(self.timeout, self.invoker.generate(prompt, generation)).await {
                Ok(result) => result,
                Err(_) => Err(InvocationError::Timeout(self.timeout)),
            }
        })
        .await
    }

    /// Render `template`, call the model and return the validated reply.
    ///
    /// A reply failing the shape or `rules`, and a timed-out call, each use one
    /// of `policy.max_attempts` attempts. Transport errors are retried with
    /// backoff inside an attempt and end the stage once those retries run out.
    pub async fn run<T>(
        &self,
        stage: StageKind,
        template: &PromptTemplate,
        bindings: &Bindings,
        generation: &GenerationConfig,
        shape: &Shape,
        rules: Rules<'_, T>,
    ) -> Result<T, StageFailure>
    where
        T: DeserializeOwned + Send,
    {
        let original = template
            .render(bindings)
            .map_err(|e| StageFailure::template(stage, 0, &e))?;
        let max_attempts = self.policy.max_attempts.max(1);

        let mut prompt = original.clone();
        let mut last_failure = None;
        for attempt in 1..=max_attempts {
            info!(stage = %stage, attempt, max_attempts, "Invoking model for stage");

            let raw = match self.invoke(&prompt, generation).await {
                Ok(raw) => raw,
                Err(err @ InvocationError::Timeout(_)) => {
                    warn!(stage = %stage, attempt, error = %err, "Model call timed out");
                    last_failure = Some(StageFailure::invocation(stage, attempt, &err));
                    continue;
                }
                Err(err) => {
                    warn!(stage = %stage, attempt, error = %err, "Model call failed");
                    return Err(StageFailure::invocation(stage, attempt, &err));
                }
            };

            let checked = validate::<T>(&raw, shape).and_then(|value| {
                let issues = rules(&value);
                if issues.is_empty() {
                    Ok(value)
                } else {
                    Err(ValidationError::Fields(issues))
                }
            });

            match checked {
                Ok(value) => {
                    if attempt > 1 {
                        info!(stage = %stage, attempt, "Stage output repaired");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(stage = %stage, attempt, error = %err, "Stage output rejected");
                    let repair = Bindings::new()
                        .bind("original_prompt", original.as_str())
                        .bind("issues", err.as_bullets())
                        .bind("previous_output", raw.as_str());
                    prompt = self
                        .repair
                        .render(&repair)
                        .map_err(|e| StageFailure::template(stage, attempt, &e))?;
                    last_failure = Some(StageFailure::validation(stage, attempt, &err, raw));
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            StageFailure::invocation(
                stage,
                max_attempts,
                &InvocationError::Configuration("no attempt was made".to_string()),
            )
        }))
    }
}

/// Rules for stages with nothing to check beyond the shape.
pub fn no_rules<T>(_: &T) -> Vec<FieldIssue> {
    Vec::new()
}
