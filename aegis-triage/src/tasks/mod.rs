pub mod critic;
pub mod diagnosis;
pub mod genomic_precision;
pub mod refinement;
pub mod triage;
pub mod types;

pub use critic::CriticTask;
pub use diagnosis::DiagnosisTask;
pub use genomic_precision::GenomicPrecisionTask;
pub use refinement::{RefinementTask, integrate_genomic_findings, unaddressed_concerns};
pub use triage::TriageStage;
pub use types::session_keys;
