use aegis_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::types::{prompt_json, session_keys};
use crate::error::StageFailure;
use crate::invoker::GenerationConfig;
use crate::models::{CritiqueResult, DiagnosisResult};
use crate::schemas;
use crate::stage::{StageKind, StageRunner, no_rules};
use crate::template::{Bindings, PromptTemplate};

/// Reviews the diagnosis and decides whether pharmacogenomics is needed
pub struct CriticTask {
    runner: Arc<StageRunner>,
    template: PromptTemplate,
    generation: GenerationConfig,
}

impl CriticTask {
    pub fn new(runner: Arc<StageRunner>, template: PromptTemplate, generation: GenerationConfig) -> Self {
        Self {
            runner,
            template,
            generation,
        }
    }

    /// `requires_genomic_review` is computed from the diagnosis, whatever the
    /// model says.
    pub async fn critique(
        &self,
        diagnosis: &DiagnosisResult,
    ) -> std::result::Result<CritiqueResult, StageFailure> {
        let bindings = Bindings::new().bind("diagnosis", prompt_json(diagnosis));

        let mut critique: CritiqueResult = self
            .runner
            .run(
                StageKind::Critic,
                &self.template,
                &bindings,
                &self.generation,
                &schemas::CRITIQUE,
                &no_rules::<CritiqueResult>,
            )
            .await?;
        critique.derive_from(diagnosis);
        Ok(critique)
    }
}

#[async_trait]
impl Task for CriticTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Starting critic stage");

        let diagnosis: DiagnosisResult = context.require(session_keys::DIAGNOSIS)?;
        let critique = self
            .critique(&diagnosis)
            .await
            .map_err(|failure| GraphError::task_failed(self.id(), failure))?;

        info!(
            concerns = critique.concerns().len(),
            requires_genomic_review = critique.requires_genomic_review,
            "Critic stage completed"
        );
        let status_message = if critique.requires_genomic_review {
            format!(
                "Critique done; pharmacogenomic review needed for {}",
                critique.medications_for_review.join(", ")
            )
        } else {
            "Critique done; no medications proposed".to_string()
        };
        context.set(session_keys::CRITIQUE, &critique)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status_message),
        ))
    }
}
