use std::sync::Arc;
use tracing::info;

use crate::error::StageFailure;
use crate::invoker::GenerationConfig;
use crate::models::TriageClassification;
use crate::schemas;
use crate::stage::{StageKind, StageRunner, no_rules};
use crate::template::{Bindings, PromptTemplate};

/// Urgency classification from the symptoms alone.
///
/// Not part of the stage graph: it shares no state with the other stages and
/// runs next to them, so a failure of the main branch does not delay it.
pub struct TriageStage {
    runner: Arc<StageRunner>,
    template: PromptTemplate,
    generation: GenerationConfig,
}

impl TriageStage {
    pub fn new(runner: Arc<StageRunner>, template: PromptTemplate, generation: GenerationConfig) -> Self {
        Self {
            runner,
            template,
            generation,
        }
    }

    pub async fn classify(&self, symptoms: &str) -> Result<TriageClassification, StageFailure> {
        info!("Starting triage classification");
        let bindings = Bindings::new().bind("symptoms", symptoms);
        let classification: TriageClassification = self
            .runner
            .run(
                StageKind::Triage,
                &self.template,
                &bindings,
                &self.generation,
                &schemas::TRIAGE,
                &no_rules::<TriageClassification>,
            )
            .await?;
        info!(urgency = %classification.urgency, "Triage classification completed");
        Ok(classification)
    }
}
