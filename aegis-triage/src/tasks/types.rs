use serde::Serialize;

pub mod session_keys {
    pub const PATIENT_CASE: &str = "patient_case";
    pub const DIAGNOSIS: &str = "diagnosis";
    pub const CRITIQUE: &str = "critique";
    pub const GENOMIC_REVIEWS: &str = "genomic_reviews";
    pub const GENOMIC_OUTCOME: &str = "genomic_outcome";
    pub const REFINED_REPORT: &str = "refined_report";
}

/// Pretty JSON of a stage result for embedding in the next prompt.
///
/// The stage result types only have string keys, so serialization does not
/// fail for them.
pub(crate) fn prompt_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

pub(crate) fn or_not_provided(text: &str) -> &str {
    if text.trim().is_empty() {
        "Not provided"
    } else {
        text
    }
}
