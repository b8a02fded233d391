use aegis_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::types::{prompt_json, session_keys};
use crate::error::StageFailure;
use crate::invoker::GenerationConfig;
use crate::models::{
    CritiqueResult, DiagnosisResult, DosingAdjustment, GenomicOutcome, GenomicReview,
    NO_GENOMIC_REVIEW_NOTE, RefinedReport,
};
use crate::schemas;
use crate::stage::{StageKind, StageRunner};
use crate::template::{Bindings, PromptTemplate};
use crate::validator::FieldIssue;

fn normalized(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Critic concerns the report does not list under `addressed_concerns`.
pub fn unaddressed_concerns(report: &RefinedReport, concerns: &[String]) -> Vec<FieldIssue> {
    let addressed: Vec<String> = report
        .addressed_concerns
        .iter()
        .filter(|a| !a.resolution.trim().is_empty())
        .map(|a| normalized(&a.concern))
        .collect();
    concerns
        .iter()
        .filter(|concern| !addressed.contains(&normalized(concern)))
        .map(|concern| {
            FieldIssue::rule(
                "addressed_concerns",
                format!("critic concern not addressed: {concern}"),
            )
        })
        .collect()
}

fn genomic_note(review: &GenomicReview) -> String {
    let mut note = format!(
        "{} ({}): {} risk, {}",
        review.medication, review.metabolism, review.risk_level, review.overall_recommendation
    );
    if !review.genetic_considerations.is_empty() {
        let variants: Vec<&str> = review
            .genetic_considerations
            .iter()
            .map(|c| c.variant.as_str())
            .collect();
        note.push_str(&format!("; variants: {}", variants.join(", ")));
    }
    if let Some(dose) = &review.dose_adjustment {
        note.push_str(&format!("; dose adjustment: {dose}"));
    }
    if !review.alternative_medications.is_empty() {
        note.push_str(&format!(
            "; alternatives: {}",
            review.alternative_medications.join(", ")
        ));
    }
    note.push_str(&format!(". {}", review.summary));
    note
}

/// Make the pharmacogenomic content of the report match what was actually
/// reviewed. Running it twice changes nothing.
pub fn integrate_genomic_findings(report: &mut RefinedReport, outcome: &GenomicOutcome) {
    match outcome {
        GenomicOutcome::NotRequired => {
            report.pharmacogenomic_review_performed = false;
            if !report.genomic_notes.iter().any(|n| n == NO_GENOMIC_REVIEW_NOTE) {
                report.genomic_notes.insert(0, NO_GENOMIC_REVIEW_NOTE.to_string());
            }
        }
        GenomicOutcome::Reviewed { reviews } => {
            report.pharmacogenomic_review_performed = true;
            for review in reviews {
                let note = genomic_note(review);
                if !report.genomic_notes.contains(&note) {
                    report.genomic_notes.push(note);
                }

                let Some(dose) = review
                    .dose_adjustment
                    .as_ref()
                    .filter(|_| review.risk_level.is_elevated())
                else {
                    continue;
                };
                let surfaced = report
                    .dosing_adjustments
                    .iter()
                    .any(|adjustment| adjustment.adjustment.contains(dose.as_str()));
                if !surfaced {
                    report.dosing_adjustments.push(DosingAdjustment {
                        medication: review.medication.clone(),
                        adjustment: dose.clone(),
                    });
                }
            }
        }
    }
}

/// Merges diagnosis, critique and pharmacogenomics into the final report
pub struct RefinementTask {
    runner: Arc<StageRunner>,
    template: PromptTemplate,
    generation: GenerationConfig,
}

impl RefinementTask {
    pub fn new(runner: Arc<StageRunner>, template: PromptTemplate, generation: GenerationConfig) -> Self {
        Self {
            runner,
            template,
            generation,
        }
    }

    pub async fn refine(
        &self,
        diagnosis: &DiagnosisResult,
        critique: &CritiqueResult,
        outcome: &GenomicOutcome,
    ) -> std::result::Result<RefinedReport, StageFailure> {
        let genomic_review = match outcome {
            GenomicOutcome::Reviewed { reviews } => prompt_json(reviews),
            GenomicOutcome::NotRequired => format!(
                "{NO_GENOMIC_REVIEW_NOTE} State this in genomic_notes and do not invent pharmacogenomic findings."
            ),
        };
        let bindings = Bindings::new()
            .bind("diagnosis", prompt_json(diagnosis))
            .bind("critique", prompt_json(critique))
            .bind("genomic_review", genomic_review);

        let concerns = critique.concerns();
        let rules = |report: &RefinedReport| unaddressed_concerns(report, &concerns);
        let mut report: RefinedReport = self
            .runner
            .run(
                StageKind::Refinement,
                &self.template,
                &bindings,
                &self.generation,
                &schemas::REFINED_REPORT,
                &rules,
            )
            .await?;

        integrate_genomic_findings(&mut report, outcome);
        Ok(report)
    }
}

#[async_trait]
impl Task for RefinementTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Starting refinement stage");

        let diagnosis: DiagnosisResult = context.require(session_keys::DIAGNOSIS)?;
        let critique: CritiqueResult = context.require(session_keys::CRITIQUE)?;
        let reviews: Option<Vec<GenomicReview>> = context.get(session_keys::GENOMIC_REVIEWS);

        let outcome = match (critique.requires_genomic_review, reviews) {
            (true, Some(reviews)) => GenomicOutcome::Reviewed { reviews },
            (false, None) => GenomicOutcome::NotRequired,
            (true, None) => {
                return Err(GraphError::ContextError(
                    "pharmacogenomic review required but not recorded".to_string(),
                ));
            }
            (false, Some(_)) => {
                return Err(GraphError::ContextError(
                    "pharmacogenomic review recorded although no medication was proposed"
                        .to_string(),
                ));
            }
        };
        context.set(session_keys::GENOMIC_OUTCOME, &outcome)?;

        let report = self
            .refine(&diagnosis, &critique, &outcome)
            .await
            .map_err(|failure| GraphError::task_failed(self.id(), failure))?;

        info!(
            severity = %report.severity,
            recommendations = report.recommendations.len(),
            dosing_adjustments = report.dosing_adjustments.len(),
            pharmacogenomic_review_performed = report.pharmacogenomic_review_performed,
            "Refinement stage completed"
        );
        context.set(session_keys::REFINED_REPORT, &report)?;

        Ok(TaskResult::new_with_status(
            Some(report.summary.clone()),
            NextAction::End,
            Some("Final report assembled".to_string()),
        ))
    }
}
