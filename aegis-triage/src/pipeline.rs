//! Pipeline orchestrator: walks the stage graph for one patient case, runs the
//! triage classification next to it, and assembles the `PipelineRun` record.

use aegis_flow::{Cancellation, FlowOutcome, GraphError, Session};
use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineFailure, StageFailure};
use crate::invoker::ModelInvoker;
use crate::models::{
    CritiqueResult, DiagnosisResult, GenomicReview, PatientCase, RefinedReport,
    TriageClassification,
};
use crate::prompts::PromptCatalog;
use crate::stage::{StageKind, StageRunner};
use crate::tasks::{TriageStage, session_keys};
use crate::workflow::TriageWorkflow;

/// Terminal state of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed(PipelineFailure),
    /// Stopped at a stage boundary; `next_stage` is the stage that did not start.
    Cancelled { next_stage: Option<StageKind> },
}

/// Everything one run produced. Contains no run ids or timestamps, so two runs
/// over the same case and the same model replies serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    case: PatientCase,
    status: RunStatus,
    diagnosis: Option<DiagnosisResult>,
    critique: Option<CritiqueResult>,
    genomic_reviews: Option<Vec<GenomicReview>>,
    report: Option<RefinedReport>,
    triage: Option<TriageClassification>,
    stages_completed: Vec<StageKind>,
}

impl PipelineRun {
    fn new(case: PatientCase) -> Self {
        Self {
            case,
            status: RunStatus::Completed,
            diagnosis: None,
            critique: None,
            genomic_reviews: None,
            report: None,
            triage: None,
            stages_completed: Vec::new(),
        }
    }

    pub fn case(&self) -> &PatientCase {
        &self.case
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The stage failure that ended the run, if any.
    pub fn failure(&self) -> Option<&StageFailure> {
        match &self.status {
            RunStatus::Failed(failure) => failure.stage_failure(),
            _ => None,
        }
    }

    pub fn diagnosis(&self) -> Option<&DiagnosisResult> {
        self.diagnosis.as_ref()
    }

    pub fn critique(&self) -> Option<&CritiqueResult> {
        self.critique.as_ref()
    }

    /// Present only when a pharmacogenomic review ran.
    pub fn genomic_reviews(&self) -> Option<&[GenomicReview]> {
        self.genomic_reviews.as_deref()
    }

    pub fn report(&self) -> Option<&RefinedReport> {
        self.report.as_ref()
    }

    pub fn triage(&self) -> Option<&TriageClassification> {
        self.triage.as_ref()
    }

    /// Stages that produced a result, main branch first.
    pub fn stages_completed(&self) -> &[StageKind] {
        &self.stages_completed
    }

    fn record_main_branch(&mut self, workflow: &TriageWorkflow, session: &Session) {
        let context = &session.context;
        self.diagnosis = context.get(session_keys::DIAGNOSIS);
        self.critique = context.get(session_keys::CRITIQUE);
        self.genomic_reviews = context.get(session_keys::GENOMIC_REVIEWS);
        self.report = context.get(session_keys::REFINED_REPORT);
        self.stages_completed.extend(
            session
                .completed_tasks
                .iter()
                .filter_map(|task_id| workflow.stage_of(task_id)),
        );
    }

    fn record_triage(&mut self, triage: TriageClassification) {
        self.triage = Some(triage);
        self.stages_completed.push(StageKind::Triage);
    }
}

/// How the main branch ended, before it is folded into a `RunStatus`.
enum BranchEnd {
    Completed,
    Cancelled(Option<StageKind>),
    Failed(PipelineFailure),
}

fn pipeline_failure(err: GraphError) -> PipelineFailure {
    match err {
        GraphError::TaskFailed { task_id, source } => match source.downcast::<StageFailure>() {
            Ok(failure) => PipelineFailure::Stage(failure),
            Err(source) => PipelineFailure::Engine {
                message: format!("task {task_id} failed: {source:#}"),
            },
        },
        other => PipelineFailure::Engine {
            message: other.to_string(),
        },
    }
}

/// Entry point of the clinical triage pipeline.
///
/// Cheap to share: every run gets its own session, and the only resource the
/// runs have in common is the `Send + Sync` model invoker.
pub struct TriagePipeline {
    workflow: TriageWorkflow,
    triage: TriageStage,
}

impl TriagePipeline {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        prompts: &PromptCatalog,
        config: &PipelineConfig,
    ) -> anyhow::Result<Self> {
        let runner = Arc::new(StageRunner::new(
            invoker,
            prompts.repair.clone(),
            config.retry.clone(),
            config.invocation_timeout(),
        ));
        let workflow = TriageWorkflow::new(runner.clone(), prompts, &config.generation)?;
        let triage = TriageStage::new(
            runner,
            prompts.triage.clone(),
            config.generation.triage.clone(),
        );
        Ok(Self { workflow, triage })
    }

    pub async fn run_triage_pipeline(&self, case: PatientCase) -> PipelineRun {
        self.run_with_cancellation(case, &Cancellation::new()).await
    }

    /// Like [`run_triage_pipeline`](Self::run_triage_pipeline), stopping at the
    /// next stage boundary once `cancel` is raised.
    pub async fn run_with_cancellation(
        &self,
        case: PatientCase,
        cancel: &Cancellation,
    ) -> PipelineRun {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline_run", run_id = %run_id);
        self.execute(run_id, case, cancel).instrument(span).await
    }

    async fn execute(&self, run_id: String, case: PatientCase, cancel: &Cancellation) -> PipelineRun {
        info!(
            has_history = !case.history.trim().is_empty(),
            has_genomic_data = case.genomic_data.is_some(),
            "Starting pipeline run"
        );

        let mut session = self.workflow.start_session(run_id);
        let mut run = PipelineRun::new(case.clone());

        let main_branch = self.run_main_branch(&case, &mut session, cancel);
        let triage = async {
            if cancel.is_cancelled() {
                return None;
            }
            Some(self.triage.classify(&case.symptoms).await)
        };
        let (branch_end, triage) = tokio::join!(main_branch, triage);

        run.record_main_branch(&self.workflow, &session);
        let triage_failure = match triage {
            Some(Ok(classification)) => {
                run.record_triage(classification);
                None
            }
            Some(Err(failure)) => Some(failure),
            None => None,
        };

        run.status = match (branch_end, triage_failure) {
            (BranchEnd::Failed(failure), _) => RunStatus::Failed(failure),
            (_, Some(failure)) => RunStatus::Failed(PipelineFailure::Stage(failure)),
            (BranchEnd::Cancelled(next_stage), None) => RunStatus::Cancelled { next_stage },
            (BranchEnd::Completed, None) => RunStatus::Completed,
        };

        match &run.status {
            RunStatus::Completed => info!(
                stages = run.stages_completed.len(),
                "Pipeline run completed"
            ),
            RunStatus::Failed(failure) => error!(error = %failure, "Pipeline run failed"),
            RunStatus::Cancelled { next_stage } => warn!(
                next_stage = ?next_stage,
                "Pipeline run cancelled"
            ),
        }
        run
    }

    async fn run_main_branch(
        &self,
        case: &PatientCase,
        session: &mut Session,
        cancel: &Cancellation,
    ) -> BranchEnd {
        if let Err(err) = session.context.set(session_keys::PATIENT_CASE, case) {
            return BranchEnd::Failed(pipeline_failure(err));
        }
        match self.workflow.flow().run(session, cancel).await {
            Ok(FlowOutcome::Completed) => BranchEnd::Completed,
            Ok(FlowOutcome::Cancelled { pending_task }) => {
                BranchEnd::Cancelled(self.workflow.stage_of(&pending_task))
            }
            Err(err) => BranchEnd::Failed(pipeline_failure(err)),
        }
    }
}
