//! AEGIS clinical triage pipeline.
//!
//! A patient case flows through Diagnosis, Critic, an optional
//! Genomic-Precision review and Refinement, each stage a model call whose JSON
//! reply is validated and repaired before the next stage sees it. A Triage
//! classification runs alongside. [`TriagePipeline::run_triage_pipeline`] is
//! the entry point.

pub mod config;
pub mod demo;
pub mod error;
pub mod invoker;
pub mod models;
pub mod pharmacogenomics;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod schemas;
pub mod stage;
pub mod tasks;
pub mod template;
pub mod validator;
pub mod workflow;

pub use config::PipelineConfig;
pub use error::{FailureKind, InvocationError, PipelineFailure, StageFailure, TemplateError, ValidationError};
pub use invoker::{GenerationConfig, ModelInvoker, OpenRouterInvoker, ScriptedInvoker};
pub use models::PatientCase;
pub use pipeline::{PipelineRun, RunStatus, TriagePipeline};
pub use prompts::PromptCatalog;
pub use retry::RetryPolicy;
pub use stage::StageKind;

pub use aegis_flow::Cancellation;
