use aegis_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::types::session_keys;
use crate::error::StageFailure;
use crate::invoker::GenerationConfig;
use crate::models::{DiagnosisResult, GenomicReview, PatientCase};
use crate::pharmacogenomics::{complete_reviews, coverage_issues, reference_interactions};
use crate::schemas;
use crate::stage::{StageKind, StageRunner};
use crate::template::{Bindings, PromptTemplate};

#[derive(Debug, Deserialize)]
struct GenomicReply {
    reviews: Vec<GenomicReview>,
}

/// Pharmacogenomic review of every medication proposed in the differential
pub struct GenomicPrecisionTask {
    runner: Arc<StageRunner>,
    template: PromptTemplate,
    generation: GenerationConfig,
}

impl GenomicPrecisionTask {
    pub fn new(runner: Arc<StageRunner>, template: PromptTemplate, generation: GenerationConfig) -> Self {
        Self {
            runner,
            template,
            generation,
        }
    }

    /// One review per medication, in the order the medications were proposed.
    pub async fn review(
        &self,
        case: &PatientCase,
        medications: &[String],
    ) -> std::result::Result<Vec<GenomicReview>, StageFailure> {
        let bindings = Bindings::new()
            .bind("patient_profile", case.profile())
            .bind(
                "proposed_medications",
                medications
                    .iter()
                    .map(|m| format!("- {m}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
            .bind(
                "genomic_data",
                case.genomic_data.as_deref().unwrap_or("Not available"),
            )
            .bind("reference_interactions", reference_interactions(medications));

        let rules = |reply: &GenomicReply| coverage_issues(&reply.reviews, medications);
        let reply: GenomicReply = self
            .runner
            .run(
                StageKind::GenomicPrecision,
                &self.template,
                &bindings,
                &self.generation,
                &schemas::GENOMIC_PRECISION,
                &rules,
            )
            .await?;

        Ok(complete_reviews(reply.reviews, medications))
    }
}

#[async_trait]
impl Task for GenomicPrecisionTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Starting genomic precision stage");

        let case: PatientCase = context.require(session_keys::PATIENT_CASE)?;
        let diagnosis: DiagnosisResult = context.require(session_keys::DIAGNOSIS)?;
        let medications = diagnosis.proposed_medications();
        if medications.is_empty() {
            return Err(GraphError::TaskExecutionFailed(
                "genomic review routed without proposed medications".to_string(),
            ));
        }

        let reviews = self
            .review(&case, &medications)
            .await
            .map_err(|failure| GraphError::task_failed(self.id(), failure))?;

        for review in &reviews {
            info!(
                medication = %review.medication,
                metabolism = %review.metabolism,
                risk_level = %review.risk_level,
                recommendation = %review.overall_recommendation,
                "Pharmacogenomic review recorded"
            );
        }
        let status_message = format!("Reviewed {} medication(s)", reviews.len());
        context.set(session_keys::GENOMIC_REVIEWS, &reviews)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status_message),
        ))
    }
}
