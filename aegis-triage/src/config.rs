use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::invoker::GenerationConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenRouter model id
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
        }
    }
}

/// Sampling parameters per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageGeneration {
    pub diagnosis: GenerationConfig,
    pub critic: GenerationConfig,
    pub genomic_precision: GenerationConfig,
    pub refinement: GenerationConfig,
    pub triage: GenerationConfig,
}

impl Default for StageGeneration {
    fn default() -> Self {
        Self {
            diagnosis: GenerationConfig::new(0.2, 1_500),
            critic: GenerationConfig::new(0.2, 1_200),
            genomic_precision: GenerationConfig::new(0.1, 2_000),
            refinement: GenerationConfig::new(0.2, 2_500),
            triage: GenerationConfig::new(0.0, 400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub retry: RetryPolicy,
    /// Upper bound for a single model call
    pub invocation_timeout_secs: u64,
    pub generation: StageGeneration,
    /// Directory with `<template>.txt` prompt overrides
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            retry: RetryPolicy::default(),
            invocation_timeout_secs: 60,
            generation: StageGeneration::default(),
            prompts_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid with `path` (YAML) when given, then with
    /// `AEGIS_MODEL` / `AEGIS_INVOCATION_TIMEOUT_SECS` from the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config = Self::from_yaml(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                info!(path = %path.display(), "Loaded pipeline configuration");
                config
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(model) = var("AEGIS_MODEL") {
            self.model.model = model;
        }
        if let Some(timeout) = var("AEGIS_INVOCATION_TIMEOUT_SECS") {
            self.invocation_timeout_secs = timeout
                .parse()
                .with_context(|| format!("AEGIS_INVOCATION_TIMEOUT_SECS={timeout:?} is not a number"))?;
        }
        Ok(())
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}
