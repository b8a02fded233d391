//! Prompt text for every stage, loaded once at start-up and injected into the
//! stage runners.

use anyhow::Context as _;
use std::path::Path;
use tracing::info;

use crate::template::PromptTemplate;

pub const SYSTEM_PROMPT: &str = r#"You are AEGIS, a clinical triage assistant.
You analyse patient presentations and support, never replace, a clinician.

Guidelines:
1. Rule out life-threatening conditions first.
2. Take demographics and risk factors into account.
3. Give an independent probability estimate (0-100) for each condition.
4. Suggest appropriate immediate interventions.
5. Never present a definitive diagnosis; always recommend professional evaluation.
6. When asked for JSON, reply with a single JSON object and nothing else."#;

const DIAGNOSIS_PROMPT: &str = r#"You are the diagnostic reasoning agent of a clinical triage system.
Produce a differential diagnosis for the presentation below.

Patient presentation:
{symptoms}

Relevant history:
{history}

Consider the three most likely conditions, red flags to rule out, immediate
actions, diagnostic tests and any medication that could be started.

Reply with only this JSON object:
{
  "differential": [
    {
      "condition": "Condition name",
      "probability": 0,
      "recommendation": "Clinical recommendation",
      "suggested_medications": ["medication"]
    }
  ],
  "severity": "low|medium|high",
  "summary": "Brief clinical summary"
}
Use an empty suggested_medications list when no medication is proposed."#;

const CRITIC_PROMPT: &str = r#"You are the quality assurance agent of a clinical triage system.
Critically review the diagnostic analysis below.

Analysis under review:
{diagnosis}

Look for missing differential diagnoses, contraindications or interactions,
under-weighted risk factors, an inappropriate severity rating and reasoning
biases. Be specific and actionable.

Reply with only this JSON object:
{
  "missing_differentials": ["condition that should be considered"],
  "contraindications": ["contraindication or interaction"],
  "risk_factors": ["risk factor to emphasise"],
  "severity_assessment": "Is the severity rating appropriate and why",
  "bias_flags": ["possible bias"],
  "feedback": "Overall actionable feedback"
}"#;

const GENOMIC_PRECISION_PROMPT: &str = r#"You are the pharmacogenomics precision agent of a clinical triage system.
Review each proposed medication for genetic variants that change its
metabolism, efficacy or safety.

Patient profile:
{patient_profile}

Proposed medications:
{proposed_medications}

Prior genomic data:
{genomic_data}

Reference drug-gene interactions for these medications:
{reference_interactions}

For every medication cover CYP450 metabolism (CYP2D6, CYP2C9, CYP2C19, CYP3A4,
CYP3A5) and the relevant variants (for example CYP2C19 *2/*3/*17 for
clopidogrel activation, CYP2C9 *2/*3 and VKORC1 -1639G>A for warfarin, TPMT and
NUDT15 for thiopurines, DPYD for fluoropyrimidines). Give dose adjustments,
alternatives, monitoring and contraindications. Every gene listed in the
reference interactions must be named in that medication's review. Use
"unknown" as the metabolism when no pathway is established.

Reply with only this JSON object, one review per proposed medication:
{
  "reviews": [
    {
      "medication": "Drug name",
      "metabolism": "Pathway, e.g. CYP2C19",
      "genetic_considerations": [
        {"variant": "Gene/variant", "effect": "Effect on the drug", "recommendation": "Clinical action"}
      ],
      "dose_adjustment": "Recommended dose, or null when no adjustment is needed",
      "alternative_medications": ["alternative"],
      "risk_level": "low|medium|high",
      "summary": "Brief summary of the pharmacogenomic findings",
      "overall_recommendation": "proceed-with-adjustments|consider-alternatives|hold-for-testing"
    }
  ]
}"#;

const REFINEMENT_PROMPT: &str = r#"You are synthesising the work of several clinical reasoning agents into a final assessment.

Original diagnosis:
{diagnosis}

Critic's review:
{critique}

Pharmacogenomic review:
{genomic_review}

The final assessment must address every concern the critic raised, apply the
pharmacogenomic recommendations, give a confident differential, list clear
actionable recommendations and match the severity of the case. Include
specific medication dosing adjustments where they apply.

Reply with only this JSON object:
{
  "differential": [
    {"condition": "Condition name", "probability": 0, "recommendation": "Recommendation", "suggested_medications": []}
  ],
  "severity": "low|medium|high",
  "summary": "Final clinical summary",
  "genomic_notes": ["pharmacogenomic note"],
  "recommendations": ["actionable recommendation"],
  "dosing_adjustments": [{"medication": "Drug", "adjustment": "Adjustment"}],
  "addressed_concerns": [{"concern": "Concern exactly as the critic wrote it", "resolution": "How it is addressed"}]
}"#;

const TRIAGE_PROMPT: &str = r#"You are an emergency medicine triage agent. Assess how urgently this patient needs care.

Patient symptoms: {symptoms}

Classify as exactly one of:
- IMMEDIATE (life-threatening, needs resuscitation)
- URGENT (serious but stable, see within 30 minutes)
- LESS_URGENT (stable, can wait 2 hours)
- NON_URGENT (routine, can wait 24 hours)

Reply with only this JSON object:
{"urgency": "IMMEDIATE|URGENT|LESS_URGENT|NON_URGENT", "reasoning": "Why", "disposition": "Recommended disposition"}"#;

const REPAIR_PROMPT: &str = r#"{original_prompt}

Your previous reply could not be accepted:
{issues}

Previous reply:
{previous_output}

Reply again with only the corrected JSON object."#;

/// Every template the pipeline uses
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    pub system: String,
    pub diagnosis: PromptTemplate,
    pub critic: PromptTemplate,
    pub genomic_precision: PromptTemplate,
    pub refinement: PromptTemplate,
    pub triage: PromptTemplate,
    pub repair: PromptTemplate,
}

const DIAGNOSIS_SLOTS: &[&str] = &["symptoms", "history"];
const CRITIC_SLOTS: &[&str] = &["diagnosis"];
const GENOMIC_SLOTS: &[&str] = &[
    "patient_profile",
    "proposed_medications",
    "genomic_data",
    "reference_interactions",
];
const REFINEMENT_SLOTS: &[&str] = &["diagnosis", "critique", "genomic_review"];
const TRIAGE_SLOTS: &[&str] = &["symptoms"];
const REPAIR_SLOTS: &[&str] = &["original_prompt", "issues", "previous_output"];

impl PromptCatalog {
    pub fn builtin() -> anyhow::Result<Self> {
        Self::assemble(|_| None)
    }

    /// Built-in templates, with `<dir>/<name>.txt` replacing the text of any
    /// template that has such a file (`system.txt` for the preamble).
    pub fn with_overrides(dir: &Path) -> anyhow::Result<Self> {
        let mut failure = None;
        let catalog = Self::assemble(|name| {
            let path = dir.join(format!("{name}.txt"));
            if !path.is_file() {
                return None;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    info!(template = name, path = %path.display(), "Loaded prompt override");
                    Some(text)
                }
                Err(e) => {
                    failure.get_or_insert(anyhow::anyhow!("reading {}: {e}", path.display()));
                    None
                }
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(catalog),
        }
    }

    fn assemble(mut load: impl FnMut(&str) -> Option<String>) -> anyhow::Result<Self> {
        let system = load("system").unwrap_or_else(|| SYSTEM_PROMPT.to_string());
        let mut template = |name: &str, builtin: &str, slots: &[&str]| {
            let text = load(name).unwrap_or_else(|| builtin.to_string());
            PromptTemplate::new(name, text, slots)
                .with_context(|| format!("invalid prompt template {name}"))
        };
        Ok(Self {
            system,
            diagnosis: template("diagnosis", DIAGNOSIS_PROMPT, DIAGNOSIS_SLOTS)?,
            critic: template("critic", CRITIC_PROMPT, CRITIC_SLOTS)?,
            genomic_precision: template(
                "genomic_precision",
                GENOMIC_PRECISION_PROMPT,
                GENOMIC_SLOTS,
            )?,
            refinement: template("refinement", REFINEMENT_PROMPT, REFINEMENT_SLOTS)?,
            triage: template("triage", TRIAGE_PROMPT, TRIAGE_SLOTS)?,
            repair: template("repair", REPAIR_PROMPT, REPAIR_SLOTS)?,
        })
    }
}
