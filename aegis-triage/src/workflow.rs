//! The main branch of the pipeline as a task graph:
//!
//! ```text
//! Diagnosis -> Critic -> [requires_genomic_review] -> Genomic-Precision -> Refinement
//!                                   \------------------------------------^
//! ```

use aegis_flow::{Context, FlowRunner, GraphBuilder, Result, Session, Task};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::StageGeneration;
use crate::models::CritiqueResult;
use crate::prompts::PromptCatalog;
use crate::stage::{StageKind, StageRunner};
use crate::tasks::{CriticTask, DiagnosisTask, GenomicPrecisionTask, RefinementTask, session_keys};

pub const GRAPH_ID: &str = "aegis_triage";

/// Branch predicate evaluated after the critic stage.
pub fn genomic_review_required(context: &Context) -> bool {
    context
        .get::<CritiqueResult>(session_keys::CRITIQUE)
        .map(|critique| critique.requires_genomic_review)
        .unwrap_or(false)
}

/// Built graph plus the stage each of its tasks stands for
pub struct TriageWorkflow {
    flow: FlowRunner,
    stages: HashMap<String, StageKind>,
}

impl TriageWorkflow {
    pub fn new(
        runner: Arc<StageRunner>,
        prompts: &PromptCatalog,
        generation: &StageGeneration,
    ) -> Result<Self> {
        let diagnosis = Arc::new(DiagnosisTask::new(
            runner.clone(),
            prompts.diagnosis.clone(),
            generation.diagnosis.clone(),
        ));
        let critic = Arc::new(CriticTask::new(
            runner.clone(),
            prompts.critic.clone(),
            generation.critic.clone(),
        ));
        let genomic = Arc::new(GenomicPrecisionTask::new(
            runner.clone(),
            prompts.genomic_precision.clone(),
            generation.genomic_precision.clone(),
        ));
        let refinement = Arc::new(RefinementTask::new(
            runner,
            prompts.refinement.clone(),
            generation.refinement.clone(),
        ));

        let diagnosis_id = diagnosis.id().to_string();
        let critic_id = critic.id().to_string();
        let genomic_id = genomic.id().to_string();
        let refinement_id = refinement.id().to_string();

        let stages = HashMap::from([
            (diagnosis_id.clone(), StageKind::Diagnosis),
            (critic_id.clone(), StageKind::Critic),
            (genomic_id.clone(), StageKind::GenomicPrecision),
            (refinement_id.clone(), StageKind::Refinement),
        ]);

        let graph = GraphBuilder::new(GRAPH_ID)
            .add_task(diagnosis)
            .add_task(critic)
            .add_task(genomic)
            .add_task(refinement)
            .add_edge(diagnosis_id.clone(), critic_id.clone())
            .add_conditional_edge(
                critic_id,
                genomic_review_required,
                genomic_id.clone(),
                refinement_id.clone(),
            )
            .add_edge(genomic_id, refinement_id)
            .set_start_task(diagnosis_id)
            .build()?;

        Ok(Self {
            flow: FlowRunner::new(Arc::new(graph)),
            stages,
        })
    }

    pub fn flow(&self) -> &FlowRunner {
        &self.flow
    }

    /// Fresh session positioned at the first stage.
    pub fn start_session(&self, session_id: impl Into<String>) -> Session {
        Session::new_from_task(session_id, GRAPH_ID, self.flow.graph().start_task_id())
    }

    pub fn stage_of(&self, task_id: &str) -> Option<StageKind> {
        self.stages.get(task_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn critique(requires_genomic_review: bool) -> CritiqueResult {
        CritiqueResult {
            missing_differentials: vec![],
            contraindications: vec![],
            risk_factors: vec![],
            severity_assessment: None,
            bias_flags: vec![],
            feedback: "ok".to_string(),
            medications_for_review: vec![],
            requires_genomic_review,
        }
    }

    #[test]
    fn branch_follows_the_critique_flag() {
        let context = Context::new();
        assert!(!genomic_review_required(&context));

        context
            .set(session_keys::CRITIQUE, critique(true))
            .unwrap();
        assert!(genomic_review_required(&context));

        context
            .set(session_keys::CRITIQUE, critique(false))
            .unwrap();
        assert!(!genomic_review_required(&context));
    }
}
