//! Canned model replies for `--dry-run`: an acute coronary syndrome
//! presentation with clopidogrel proposed, so every stage runs.

use crate::invoker::ScriptedInvoker;
use crate::models::PatientCase;
use crate::stage::StageKind;

pub const DIAGNOSIS_REPLY: &str = r#"Here is the analysis:
{
  "differential": [
    {
      "condition": "Acute MI",
      "probability": 70,
      "recommendation": "12-lead ECG and serial troponins, activate the cath lab if STEMI",
      "suggested_medications": ["aspirin", "clopidogrel"]
    },
    {
      "condition": "Unstable angina",
      "probability": 20,
      "recommendation": "Serial ECGs and cardiology review",
      "suggested_medications": []
    },
    {
      "condition": "Pulmonary embolism",
      "probability": 10,
      "recommendation": "Wells score, D-dimer or CT pulmonary angiography",
      "suggested_medications": []
    }
  ],
  "severity": "High",
  "summary": "Chest pain with diaphoresis in a hypertensive smoker, acute coronary syndrome until proven otherwise."
}"#;

pub const CRITIC_REPLY: &str = r#"{
  "missing_differentials": ["Aortic dissection"],
  "contraindications": ["Dual antiplatelet therapy before dissection is excluded"],
  "risk_factors": ["Smoking", "Hypertension"],
  "severity_assessment": "high is appropriate",
  "bias_flags": [],
  "feedback": "Exclude aortic dissection before loading antiplatelets.",
  "requires_genomic_review": false
}"#;

pub const GENOMIC_REPLY: &str = r#"{
  "reviews": [
    {
      "medication": "clopidogrel",
      "metabolism": "Prodrug activated by CYP2C19",
      "genetic_considerations": [
        {
          "variant": "CYP2C19*2/*2",
          "effect": "Poor metabolizer, little active metabolite",
          "recommendation": "Avoid clopidogrel"
        }
      ],
      "dose_adjustment": "Avoid clopidogrel in CYP2C19 poor metabolizers; use prasugrel or ticagrelor",
      "alternative_medications": ["prasugrel", "ticagrelor"],
      "risk_level": "HIGH",
      "summary": "Reduced antiplatelet effect expected for this CYP2C19 genotype.",
      "overall_recommendation": "consider alternatives"
    }
  ]
}"#;

pub const REFINEMENT_REPLY: &str = r#"{
  "differential": [
    {
      "condition": "Acute MI",
      "probability": 65,
      "recommendation": "12-lead ECG, serial troponins, cardiology",
      "suggested_medications": ["aspirin", "ticagrelor"]
    },
    {
      "condition": "Aortic dissection",
      "probability": 10,
      "recommendation": "CT angiography before antiplatelet loading",
      "suggested_medications": []
    }
  ],
  "severity": "high",
  "summary": "Probable acute coronary syndrome; dissection to be excluded first.",
  "genomic_notes": [],
  "recommendations": [
    "Exclude aortic dissection with CT angiography",
    "Load aspirin once dissection is excluded",
    "Use ticagrelor instead of clopidogrel"
  ],
  "dosing_adjustments": [],
  "addressed_concerns": [
    {"concern": "Aortic dissection", "resolution": "Added to the differential with CT angiography"},
    {"concern": "Dual antiplatelet therapy before dissection is excluded", "resolution": "Antiplatelets deferred until CT angiography"}
  ]
}"#;

pub const TRIAGE_REPLY: &str = r#"{"urgency": "immediate", "reasoning": "Possible acute coronary syndrome", "disposition": "Resuscitation bay, ECG within 10 minutes"}"#;

pub fn demo_case() -> PatientCase {
    PatientCase::new("chest pain, diaphoresis", "hypertension, 30 pack-year smoker")
        .with_demographic("age", "58")
        .with_demographic("sex", "male")
        .with_genomic_data("CYP2C19 *2/*2")
}

/// Invoker answering every built-in stage prompt with the replies above.
pub fn demo_invoker() -> ScriptedInvoker {
    ScriptedInvoker::new()
        .reply(StageKind::Diagnosis, DIAGNOSIS_REPLY)
        .reply(StageKind::Critic, CRITIC_REPLY)
        .reply(StageKind::GenomicPrecision, GENOMIC_REPLY)
        .reply(StageKind::Refinement, REFINEMENT_REPLY)
        .reply(StageKind::Triage, TRIAGE_REPLY)
}
