use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::validator::canonicalize;

/// Input of a single pipeline run. Never mutated once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCase {
    pub symptoms: String,
    #[serde(default)]
    pub history: String,
    /// Demographics and risk factors, e.g. `age`, `sex`, `smoker`.
    #[serde(default)]
    pub demographics: BTreeMap<String, String>,
    /// Prior genotyping results, free text.
    #[serde(default)]
    pub genomic_data: Option<String>,
}

impl PatientCase {
    pub fn new(symptoms: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            symptoms: symptoms.into(),
            history: history.into(),
            demographics: BTreeMap::new(),
            genomic_data: None,
        }
    }

    pub fn with_demographic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.demographics.insert(key.into(), value.into());
        self
    }

    pub fn with_genomic_data(mut self, data: impl Into<String>) -> Self {
        self.genomic_data = Some(data.into());
        self
    }

    /// Demographics rendered one `key: value` per line, in key order.
    pub fn profile(&self) -> String {
        if self.demographics.is_empty() {
            return "Not provided".to_string();
        }
        self.demographics
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Enumerations whose wire spelling is canonicalised case-insensitively.
pub trait Canonical: Sized + Copy {
    const DOMAIN: &'static [&'static str];

    fn from_canonical(value: &str) -> Option<Self>;

    fn as_str(&self) -> &'static str;

    fn parse_loose(raw: &str) -> Result<Self, UnknownVariant> {
        canonicalize(raw, Self::DOMAIN)
            .and_then(Self::from_canonical)
            .ok_or_else(|| UnknownVariant {
                value: raw.to_string(),
                allowed: Self::DOMAIN,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{value:?} is not one of {allowed:?}")]
pub struct UnknownVariant {
    pub value: String,
    pub allowed: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Canonical for Severity {
    const DOMAIN: &'static [&'static str] = &["low", "medium", "high"];

    fn from_canonical(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Pharmacogenomic risk of a proposed medication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Medium and high risk reviews must have their dose adjustments surfaced.
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }
}

impl Canonical for RiskLevel {
    const DOMAIN: &'static [&'static str] = &["low", "medium", "high"];

    fn from_canonical(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallRecommendation {
    ProceedWithAdjustments,
    ConsiderAlternatives,
    HoldForTesting,
}

impl Canonical for OverallRecommendation {
    const DOMAIN: &'static [&'static str] = &[
        "proceed-with-adjustments",
        "consider-alternatives",
        "hold-for-testing",
    ];

    fn from_canonical(value: &str) -> Option<Self> {
        match value {
            "proceed-with-adjustments" => Some(Self::ProceedWithAdjustments),
            "consider-alternatives" => Some(Self::ConsiderAlternatives),
            "hold-for-testing" => Some(Self::HoldForTesting),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::ProceedWithAdjustments => "proceed-with-adjustments",
            Self::ConsiderAlternatives => "consider-alternatives",
            Self::HoldForTesting => "hold-for-testing",
        }
    }
}

/// Emergency triage urgency. Exactly four levels exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Immediate,
    Urgent,
    LessUrgent,
    NonUrgent,
}

impl Canonical for Urgency {
    const DOMAIN: &'static [&'static str] = &["IMMEDIATE", "URGENT", "LESS_URGENT", "NON_URGENT"];

    fn from_canonical(value: &str) -> Option<Self> {
        match value {
            "IMMEDIATE" => Some(Self::Immediate),
            "URGENT" => Some(Self::Urgent),
            "LESS_URGENT" => Some(Self::LessUrgent),
            "NON_URGENT" => Some(Self::NonUrgent),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Urgent => "URGENT",
            Self::LessUrgent => "LESS_URGENT",
            Self::NonUrgent => "NON_URGENT",
        }
    }
}

macro_rules! canonical_text {
    ($($ty:ty),*) => {$(
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_loose(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )*};
}

canonical_text!(Severity, RiskLevel, OverallRecommendation, Urgency);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferentialItem {
    pub condition: String,
    /// Independent estimate for this condition, 0-100. Items of one
    /// differential do not have to sum to 100.
    pub probability: u8,
    pub recommendation: String,
    #[serde(default)]
    pub suggested_medications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub differential: Vec<DifferentialItem>,
    pub severity: Severity,
    pub summary: String,
}

impl DiagnosisResult {
    /// Trim medication names and drop blank entries.
    pub fn normalize(&mut self) {
        for item in &mut self.differential {
            item.suggested_medications = item
                .suggested_medications
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
    }

    /// Union of every suggested medication, de-duplicated case-insensitively
    /// in first-seen order.
    pub fn proposed_medications(&self) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        let mut medications = Vec::new();
        for medication in self
            .differential
            .iter()
            .flat_map(|item| item.suggested_medications.iter())
        {
            let medication = medication.trim();
            let key = medication.to_lowercase();
            if medication.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            medications.push(medication.to_string());
        }
        medications
    }

    pub fn requires_genomic_review(&self) -> bool {
        !self.proposed_medications().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CritiqueResult {
    #[serde(default)]
    pub missing_differentials: Vec<String>,
    #[serde(default)]
    pub contraindications: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub severity_assessment: Option<String>,
    #[serde(default)]
    pub bias_flags: Vec<String>,
    pub feedback: String,
    /// Derived from the diagnosis, never taken from the model.
    #[serde(default)]
    pub medications_for_review: Vec<String>,
    /// Derived from the diagnosis, never taken from the model.
    #[serde(default)]
    pub requires_genomic_review: bool,
}

impl CritiqueResult {
    /// Overwrite the derived fields from the reviewed diagnosis.
    pub fn derive_from(&mut self, diagnosis: &DiagnosisResult) {
        self.medications_for_review = diagnosis.proposed_medications();
        self.requires_genomic_review = !self.medications_for_review.is_empty();
    }

    /// Concerns the refinement stage has to address.
    pub fn concerns(&self) -> Vec<String> {
        self.missing_differentials
            .iter()
            .chain(&self.contraindications)
            .chain(&self.bias_flags)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomicConsideration {
    pub variant: String,
    pub effect: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomicReview {
    pub medication: String,
    pub metabolism: String,
    #[serde(default)]
    pub genetic_considerations: Vec<GenomicConsideration>,
    #[serde(default)]
    pub dose_adjustment: Option<String>,
    #[serde(default)]
    pub alternative_medications: Vec<String>,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub overall_recommendation: OverallRecommendation,
}

impl GenomicReview {
    /// All free text of the review, for gene coverage checks.
    pub fn text(&self) -> String {
        let mut text = vec![self.metabolism.as_str(), self.summary.as_str()];
        for consideration in &self.genetic_considerations {
            text.push(&consideration.variant);
            text.push(&consideration.effect);
            text.push(&consideration.recommendation);
        }
        text.join(" ")
    }
}

/// What the refinement stage is told about pharmacogenomics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenomicOutcome {
    Reviewed { reviews: Vec<GenomicReview> },
    NotRequired,
}

pub const NO_GENOMIC_REVIEW_NOTE: &str =
    "No pharmacogenomic review was performed: no medications were proposed.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosingAdjustment {
    pub medication: String,
    pub adjustment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedConcern {
    pub concern: String,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedReport {
    pub differential: Vec<DifferentialItem>,
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub genomic_notes: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub dosing_adjustments: Vec<DosingAdjustment>,
    #[serde(default)]
    pub addressed_concerns: Vec<AddressedConcern>,
    #[serde(default)]
    pub pharmacogenomic_review_performed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageClassification {
    pub urgency: Urgency,
    pub reasoning: String,
    pub disposition: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(condition: &str, medications: &[&str]) -> DifferentialItem {
        DifferentialItem {
            condition: condition.to_string(),
            probability: 40,
            recommendation: "evaluate".to_string(),
            suggested_medications: medications.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn enum_values_canonicalize_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("Medium".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert_eq!("less urgent".parse::<Urgency>().unwrap(), Urgency::LessUrgent);
        assert_eq!(
            "Proceed with adjustments".parse::<OverallRecommendation>().unwrap(),
            OverallRecommendation::ProceedWithAdjustments
        );
    }

    fn assert_domain_round_trips<T: Canonical>() {
        for value in T::DOMAIN {
            for spelling in [value.to_uppercase(), value.to_lowercase(), value.to_string()] {
                let parsed = T::parse_loose(&spelling)
                    .unwrap_or_else(|e| panic!("{spelling} rejected: {e}"));
                assert_eq!(parsed.as_str(), *value);
            }
        }
    }

    #[test]
    fn every_canonical_value_round_trips() {
        assert_domain_round_trips::<Severity>();
        assert_domain_round_trips::<RiskLevel>();
        assert_domain_round_trips::<OverallRecommendation>();
        assert_domain_round_trips::<Urgency>();
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        assert!("critical".parse::<Severity>().is_err());
        assert!("EMERGENT".parse::<Urgency>().is_err());
        assert!("".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn proposed_medications_are_unioned_in_first_seen_order() {
        let mut diagnosis = DiagnosisResult {
            differential: vec![
                item("Acute MI", &["Aspirin", " clopidogrel "]),
                item("Unstable angina", &["aspirin", "", "heparin"]),
            ],
            severity: Severity::High,
            summary: "chest pain".to_string(),
        };
        diagnosis.normalize();

        assert_eq!(
            diagnosis.proposed_medications(),
            vec!["Aspirin", "clopidogrel", "heparin"]
        );
        assert!(diagnosis.requires_genomic_review());
        assert_eq!(diagnosis.differential[1].suggested_medications.len(), 2);
    }

    #[test]
    fn blank_medications_do_not_trigger_review() {
        let mut diagnosis = DiagnosisResult {
            differential: vec![item("Rhinitis", &["  "])],
            severity: Severity::Low,
            summary: "mild".to_string(),
        };
        diagnosis.normalize();
        assert!(!diagnosis.requires_genomic_review());
        assert!(diagnosis.differential[0].suggested_medications.is_empty());
    }

    #[test]
    fn profile_is_rendered_in_key_order() {
        let case = PatientCase::new("cough", "")
            .with_demographic("sex", "female")
            .with_demographic("age", "54");
        assert_eq!(case.profile(), "age: 54\nsex: female");
        assert_eq!(PatientCase::new("cough", "").profile(), "Not provided");
    }
}
