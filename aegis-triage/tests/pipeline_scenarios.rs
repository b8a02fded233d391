use aegis_triage::demo::{self, demo_case, demo_invoker};
use aegis_triage::models::{NO_GENOMIC_REVIEW_NOTE, OverallRecommendation, RiskLevel, Urgency};
use aegis_triage::{
    Cancellation, FailureKind, PatientCase, PipelineConfig, PipelineFailure, PromptCatalog,
    RetryPolicy, RunStatus, ScriptedInvoker, StageKind, TriagePipeline,
};
use std::sync::Arc;
use std::time::Duration;

const RHINITIS_DIAGNOSIS: &str = r#"{
  "differential": [
    {"condition": "Allergic rhinitis", "probability": 85, "recommendation": "Allergen avoidance", "suggested_medications": []},
    {"condition": "Viral URTI", "probability": 15, "recommendation": "Supportive care", "suggested_medications": ["  "]}
  ],
  "severity": "low",
  "summary": "Seasonal allergic rhinitis."
}"#;

const RHINITIS_CRITIQUE: &str = r#"{
  "missing_differentials": [],
  "contraindications": [],
  "risk_factors": [],
  "severity_assessment": null,
  "bias_flags": [],
  "feedback": "Reasonable assessment.",
  "requires_genomic_review": true
}"#;

const RHINITIS_REPORT: &str = r#"{
  "differential": [
    {"condition": "Allergic rhinitis", "probability": 85, "recommendation": "Allergen avoidance", "suggested_medications": []}
  ],
  "severity": "low",
  "summary": "Seasonal allergic rhinitis, routine care.",
  "recommendations": ["Allergen avoidance", "Primary care follow-up if symptoms persist"]
}"#;

const RHINITIS_TRIAGE: &str =
    r#"{"urgency": "non urgent", "reasoning": "Mild, stable", "disposition": "Primary care"}"#;

const CHEST_PAIN_TRIAGE: &str = r#"{"urgency": "IMMEDIATE", "reasoning": "Possible STEMI", "disposition": "Resuscitation bay"}"#;

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            ..RetryPolicy::default()
        },
        invocation_timeout_secs: 5,
        ..PipelineConfig::default()
    }
}

fn pipeline(invoker: Arc<ScriptedInvoker>) -> TriagePipeline {
    let prompts = PromptCatalog::builtin().unwrap();
    TriagePipeline::new(invoker, &prompts, &fast_config()).unwrap()
}

fn rhinitis_invoker() -> ScriptedInvoker {
    ScriptedInvoker::new()
        .reply(StageKind::Diagnosis, RHINITIS_DIAGNOSIS)
        .reply(StageKind::Critic, RHINITIS_CRITIQUE)
        .reply(StageKind::Refinement, RHINITIS_REPORT)
        .reply(StageKind::Triage, RHINITIS_TRIAGE)
}

#[tokio::test]
async fn medications_trigger_a_pharmacogenomic_review() {
    let invoker = Arc::new(demo_invoker());
    let run = pipeline(invoker.clone())
        .run_triage_pipeline(demo_case())
        .await;

    assert_eq!(run.status(), &RunStatus::Completed);
    assert_eq!(
        run.stages_completed(),
        &[
            StageKind::Diagnosis,
            StageKind::Critic,
            StageKind::GenomicPrecision,
            StageKind::Refinement,
            StageKind::Triage,
        ]
    );

    let critique = run.critique().unwrap();
    assert!(critique.requires_genomic_review);
    assert_eq!(critique.medications_for_review, vec!["aspirin", "clopidogrel"]);

    let reviews = run.genomic_reviews().unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].medication, "aspirin");
    assert_eq!(reviews[0].metabolism, "unknown");
    assert_eq!(reviews[1].medication, "clopidogrel");
    assert!(reviews[1].metabolism.contains("CYP2C19"));
    assert_eq!(reviews[1].risk_level, RiskLevel::High);
    assert_eq!(
        reviews[1].overall_recommendation,
        OverallRecommendation::ConsiderAlternatives
    );

    let report = run.report().unwrap();
    assert!(report.pharmacogenomic_review_performed);
    assert!(report.genomic_notes.iter().any(|note| note.contains("CYP2C19")));
    assert!(report.dosing_adjustments.iter().any(|adjustment| {
        adjustment.medication == "clopidogrel" && adjustment.adjustment.contains("CYP2C19")
    }));
    assert_eq!(run.triage().unwrap().urgency, Urgency::Immediate);

    // the genomic prompt carries the curated reference row for clopidogrel
    let genomic_prompt = &invoker.prompts(StageKind::GenomicPrecision)[0];
    assert!(genomic_prompt.contains("CYP2C19 *2/*2"));
    assert!(genomic_prompt.contains("- aspirin\n- clopidogrel"));
}

#[tokio::test]
async fn no_medications_skip_the_pharmacogenomic_review() {
    let invoker = Arc::new(rhinitis_invoker());
    let run = pipeline(invoker.clone())
        .run_triage_pipeline(PatientCase::new("mild seasonal rhinitis", ""))
        .await;

    assert_eq!(run.status(), &RunStatus::Completed);
    assert!(run.genomic_reviews().is_none());
    assert_eq!(invoker.calls(StageKind::GenomicPrecision), 0);
    // the model's claim is overridden by the diagnosis
    assert!(!run.critique().unwrap().requires_genomic_review);
    assert!(!run.stages_completed().contains(&StageKind::GenomicPrecision));

    let report = run.report().unwrap();
    assert!(!report.pharmacogenomic_review_performed);
    assert_eq!(report.genomic_notes[0], NO_GENOMIC_REVIEW_NOTE);

    let refinement_prompt = &invoker.prompts(StageKind::Refinement)[0];
    assert!(refinement_prompt.contains(NO_GENOMIC_REVIEW_NOTE));
    assert_eq!(run.triage().unwrap().urgency, Urgency::NonUrgent);
}

#[tokio::test]
async fn malformed_diagnosis_twice_fails_the_run() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, r#"{"differential": [ {"condition": "#)
            .reply(StageKind::Triage, RHINITIS_TRIAGE),
    );
    let run = pipeline(invoker.clone())
        .run_triage_pipeline(PatientCase::new("headache", "none"))
        .await;

    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, StageKind::Diagnosis);
    assert_eq!(failure.kind, FailureKind::Validation);
    assert_eq!(failure.repair_attempts, 2);
    assert_eq!(invoker.calls(StageKind::Diagnosis), 2);
    assert_eq!(invoker.calls(StageKind::Critic), 0);

    assert!(run.diagnosis().is_none());
    assert!(run.report().is_none());
    assert!(!run.stages_completed().contains(&StageKind::Diagnosis));

    let json = serde_json::to_value(&run).unwrap();
    assert_eq!(json["status"]["state"], "failed");
    assert_eq!(json["status"]["origin"], "stage");
    assert_eq!(json["status"]["stage"], "Diagnosis");
    assert_eq!(json["status"]["repair_attempts"], 2);
}

#[tokio::test]
async fn critic_failure_keeps_the_diagnosis_and_stops() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, demo::DIAGNOSIS_REPLY)
            .reply(StageKind::Critic, r#"{"missing_differentials": []}"#)
            .reply(StageKind::Triage, demo::TRIAGE_REPLY),
    );
    let run = pipeline(invoker.clone()).run_triage_pipeline(demo_case()).await;

    assert_eq!(run.failure().unwrap().stage, StageKind::Critic);
    assert!(run.diagnosis().is_some());
    assert!(run.genomic_reviews().is_none());
    assert_eq!(invoker.calls(StageKind::Diagnosis), 1);
    assert_eq!(invoker.calls(StageKind::GenomicPrecision), 0);
}

#[tokio::test]
async fn identical_inputs_give_identical_runs() {
    let first = pipeline(Arc::new(demo_invoker()))
        .run_triage_pipeline(demo_case())
        .await;
    let second = pipeline(Arc::new(demo_invoker()))
        .run_triage_pipeline(demo_case())
        .await;

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn genomic_review_exists_iff_medications_were_proposed() {
    let cases = [
        (demo::DIAGNOSIS_REPLY, true),
        (RHINITIS_DIAGNOSIS, false),
    ];
    for (diagnosis, expect_review) in cases {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply(StageKind::Diagnosis, diagnosis)
                .reply(StageKind::Critic, RHINITIS_CRITIQUE)
                .reply(StageKind::GenomicPrecision, demo::GENOMIC_REPLY)
                .reply(StageKind::Refinement, RHINITIS_REPORT)
                .reply(StageKind::Triage, RHINITIS_TRIAGE),
        );
        let run = pipeline(invoker).run_triage_pipeline(demo_case()).await;

        assert_eq!(run.status(), &RunStatus::Completed);
        let has_medications = !run.diagnosis().unwrap().proposed_medications().is_empty();
        assert_eq!(has_medications, expect_review);
        assert_eq!(run.genomic_reviews().is_some(), expect_review);
        assert_eq!(
            run.report().unwrap().pharmacogenomic_review_performed,
            expect_review
        );
    }
}

#[tokio::test]
async fn triage_is_independent_of_the_main_branch() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, "the model is confused")
            .reply(StageKind::Triage, CHEST_PAIN_TRIAGE),
    );
    let run = pipeline(invoker)
        .run_triage_pipeline(PatientCase::new(
            "severe crushing chest pain radiating to left arm",
            "",
        ))
        .await;

    assert!(matches!(
        run.status(),
        RunStatus::Failed(PipelineFailure::Stage(_))
    ));
    assert_eq!(run.triage().unwrap().urgency, Urgency::Immediate);
    assert_eq!(run.stages_completed(), &[StageKind::Triage]);
}

#[tokio::test]
async fn triage_failure_fails_an_otherwise_complete_run() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, RHINITIS_DIAGNOSIS)
            .reply(StageKind::Critic, RHINITIS_CRITIQUE)
            .reply(StageKind::Refinement, RHINITIS_REPORT)
            .reply(StageKind::Triage, r#"{"urgency": "SEMI_URGENT", "reasoning": "x", "disposition": "y"}"#),
    );
    let run = pipeline(invoker)
        .run_triage_pipeline(PatientCase::new("mild seasonal rhinitis", ""))
        .await;

    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, StageKind::Triage);
    assert_eq!(failure.repair_attempts, 2);
    assert!(run.report().is_some());
    assert!(run.triage().is_none());
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let invoker = Arc::new(demo_invoker());
    let cancel = Cancellation::new();
    cancel.cancel();

    let run = pipeline(invoker.clone())
        .run_with_cancellation(demo_case(), &cancel)
        .await;

    assert_eq!(
        run.status(),
        &RunStatus::Cancelled {
            next_stage: Some(StageKind::Diagnosis)
        }
    );
    assert!(run.stages_completed().is_empty());
    assert_eq!(invoker.calls(StageKind::Diagnosis), 0);
    assert_eq!(invoker.calls(StageKind::Triage), 0);
}

#[tokio::test]
async fn cancellation_waits_for_the_running_stage() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, demo::DIAGNOSIS_REPLY)
            .with_latency(Duration::from_millis(200))
            .reply(StageKind::Critic, demo::CRITIC_REPLY)
            .reply(StageKind::Triage, demo::TRIAGE_REPLY),
    );
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let run = pipeline(invoker.clone())
        .run_with_cancellation(demo_case(), &cancel)
        .await;

    assert_eq!(
        run.status(),
        &RunStatus::Cancelled {
            next_stage: Some(StageKind::Critic)
        }
    );
    assert!(run.diagnosis().is_some());
    assert_eq!(invoker.calls(StageKind::Critic), 0);
    assert_eq!(run.triage().unwrap().urgency, Urgency::Immediate);
}

#[tokio::test]
async fn unaddressed_critic_concern_is_repaired() {
    let incomplete = demo::REFINEMENT_REPLY.replace(
        r#"{"concern": "Aortic dissection", "resolution": "Added to the differential with CT angiography"},"#,
        "",
    );
    assert_ne!(incomplete, demo::REFINEMENT_REPLY);

    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, demo::DIAGNOSIS_REPLY)
            .reply(StageKind::Critic, demo::CRITIC_REPLY)
            .reply(StageKind::GenomicPrecision, demo::GENOMIC_REPLY)
            .replies(
                StageKind::Refinement,
                vec![Ok(incomplete), Ok(demo::REFINEMENT_REPLY.to_string())],
            )
            .reply(StageKind::Triage, demo::TRIAGE_REPLY),
    );
    let run = pipeline(invoker.clone()).run_triage_pipeline(demo_case()).await;

    assert_eq!(run.status(), &RunStatus::Completed);
    let prompts = invoker.prompts(StageKind::Refinement);
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("critic concern not addressed: Aortic dissection"));
}

#[tokio::test]
async fn genomic_review_missing_required_gene_is_repaired() {
    let vague = demo::GENOMIC_REPLY
        .replace("Prodrug activated by CYP2C19", "Hepatic activation")
        .replace("CYP2C19*2/*2", "loss-of-function allele")
        .replace("this CYP2C19 genotype", "this genotype")
        .replace("in CYP2C19 poor metabolizers", "in poor metabolizers");
    assert!(!vague.contains("CYP2C19"));

    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply(StageKind::Diagnosis, demo::DIAGNOSIS_REPLY)
            .reply(StageKind::Critic, demo::CRITIC_REPLY)
            .replies(
                StageKind::GenomicPrecision,
                vec![Ok(vague), Ok(demo::GENOMIC_REPLY.to_string())],
            )
            .reply(StageKind::Refinement, demo::REFINEMENT_REPLY)
            .reply(StageKind::Triage, demo::TRIAGE_REPLY),
    );
    let run = pipeline(invoker.clone()).run_triage_pipeline(demo_case()).await;

    assert_eq!(run.status(), &RunStatus::Completed);
    assert_eq!(invoker.calls(StageKind::GenomicPrecision), 2);
    assert!(
        invoker.prompts(StageKind::GenomicPrecision)[1]
            .contains("review of clopidogrel must address CYP2C19")
    );
}

/// One invoker serving both the chest pain and the rhinitis case. Routes are
/// tried in order, so text unique to the rhinitis prompts comes first.
fn two_case_invoker() -> ScriptedInvoker {
    let reply = |text: &str| vec![Ok(text.to_string())];
    ScriptedInvoker::new()
        .route(NO_GENOMIC_REVIEW_NOTE, reply(RHINITIS_REPORT))
        .route(
            StageKind::Refinement.builtin_marker(),
            reply(demo::REFINEMENT_REPLY),
        )
        .route("Seasonal allergic rhinitis.", reply(RHINITIS_CRITIQUE))
        .route(StageKind::Critic.builtin_marker(), reply(demo::CRITIC_REPLY))
        .route(
            StageKind::GenomicPrecision.builtin_marker(),
            reply(demo::GENOMIC_REPLY),
        )
        .route("Patient symptoms: mild seasonal rhinitis", reply(RHINITIS_TRIAGE))
        .route(StageKind::Triage.builtin_marker(), reply(demo::TRIAGE_REPLY))
        .route("mild seasonal rhinitis", reply(RHINITIS_DIAGNOSIS))
        .route(
            StageKind::Diagnosis.builtin_marker(),
            reply(demo::DIAGNOSIS_REPLY),
        )
}

#[tokio::test]
async fn concurrent_runs_share_only_the_invoker() {
    let rhinitis = PatientCase::new("mild seasonal rhinitis", "");

    let chest_pain_alone = pipeline(Arc::new(two_case_invoker()))
        .run_triage_pipeline(demo_case())
        .await;
    let rhinitis_alone = pipeline(Arc::new(two_case_invoker()))
        .run_triage_pipeline(rhinitis.clone())
        .await;
    assert_eq!(chest_pain_alone.status(), &RunStatus::Completed);
    assert_eq!(rhinitis_alone.status(), &RunStatus::Completed);
    assert!(chest_pain_alone.genomic_reviews().is_some());
    assert!(rhinitis_alone.genomic_reviews().is_none());

    let invoker = Arc::new(two_case_invoker());
    let shared = pipeline(invoker.clone());
    let (chest_pain, rhinitis) = tokio::join!(
        shared.run_triage_pipeline(demo_case()),
        shared.run_triage_pipeline(rhinitis),
    );

    assert_eq!(chest_pain, chest_pain_alone);
    assert_eq!(rhinitis, rhinitis_alone);
    assert_eq!(invoker.calls(StageKind::GenomicPrecision), 1);
}
