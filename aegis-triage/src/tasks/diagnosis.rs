use aegis_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::types::{or_not_provided, session_keys};
use crate::error::StageFailure;
use crate::invoker::GenerationConfig;
use crate::models::{DiagnosisResult, PatientCase};
use crate::schemas;
use crate::stage::{StageKind, StageRunner, no_rules};
use crate::template::{Bindings, PromptTemplate};

/// Produces the differential diagnosis from symptoms and history
pub struct DiagnosisTask {
    runner: Arc<StageRunner>,
    template: PromptTemplate,
    generation: GenerationConfig,
}

impl DiagnosisTask {
    pub fn new(runner: Arc<StageRunner>, template: PromptTemplate, generation: GenerationConfig) -> Self {
        Self {
            runner,
            template,
            generation,
        }
    }

    pub async fn diagnose(&self, case: &PatientCase) -> std::result::Result<DiagnosisResult, StageFailure> {
        let bindings = Bindings::new()
            .bind("symptoms", case.symptoms.as_str())
            .bind("history", or_not_provided(&case.history));

        let mut diagnosis: DiagnosisResult = self
            .runner
            .run(
                StageKind::Diagnosis,
                &self.template,
                &bindings,
                &self.generation,
                &schemas::DIAGNOSIS,
                &no_rules::<DiagnosisResult>,
            )
            .await?;
        diagnosis.normalize();
        Ok(diagnosis)
    }
}

#[async_trait]
impl Task for DiagnosisTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Starting diagnosis stage");

        let case: PatientCase = context.require(session_keys::PATIENT_CASE)?;
        let diagnosis = self
            .diagnose(&case)
            .await
            .map_err(|failure| GraphError::task_failed(self.id(), failure))?;

        let status_message = format!(
            "Differential with {} condition(s), severity {}",
            diagnosis.differential.len(),
            diagnosis.severity
        );
        info!(
            conditions = diagnosis.differential.len(),
            severity = %diagnosis.severity,
            medications = diagnosis.proposed_medications().len(),
            "Diagnosis stage completed"
        );
        context.set(session_keys::DIAGNOSIS, &diagnosis)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status_message),
        ))
    }
}
