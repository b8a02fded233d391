use async_trait::async_trait;
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::InvocationError;
use crate::stage::StageKind;

/// Sampling parameters passed through to the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u64>,
    pub stop_sequences: Vec<String>,
}

impl GenerationConfig {
    pub fn new(temperature: f64, max_output_tokens: u64) -> Self {
        Self {
            temperature: Some(temperature),
            max_output_tokens: Some(max_output_tokens),
            stop_sequences: Vec::new(),
        }
    }
}

/// Text generation collaborator. Implementations must be safe to share
/// between concurrent pipeline runs; the same prompt may yield different text
/// on every call.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, InvocationError>;
}

/// Invoker backed by an OpenRouter-hosted model through rig
pub struct OpenRouterInvoker {
    client: openrouter::Client,
    model: String,
    preamble: String,
}

impl OpenRouterInvoker {
    /// Reads the API key from the environment variable named in `config`.
    pub fn from_env(config: &ModelConfig, preamble: impl Into<String>) -> Result<Self, InvocationError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            InvocationError::Configuration(format!("{} not set", config.api_key_env))
        })?;
        Ok(Self {
            client: openrouter::Client::new(&api_key),
            model: config.model.clone(),
            preamble: preamble.into(),
        })
    }
}

#[async_trait]
impl ModelInvoker for OpenRouterInvoker {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, InvocationError> {
        let mut builder = self.client.agent(&self.model).preamble(&self.preamble);
        if let Some(temperature) = config.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = config.max_output_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if !config.stop_sequences.is_empty() {
            builder = builder.additional_params(serde_json::json!({ "stop": config.stop_sequences }));
        }
        let agent = builder.build();

        debug!(model = %self.model, prompt_chars = prompt.len(), "Invoking model");
        agent
            .prompt(prompt)
            .await
            .map_err(|e| InvocationError::Unavailable(e.to_string()))
    }
}

struct Route {
    needle: String,
    replies: Vec<Result<String, InvocationError>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

/// In-memory invoker returning scripted replies.
///
/// A prompt is routed to the first route whose needle it contains. Each route
/// plays its replies in order and keeps repeating the last one.
#[derive(Default)]
pub struct ScriptedInvoker {
    routes: Vec<Route>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        needle: impl Into<String>,
        replies: Vec<Result<String, InvocationError>>,
    ) -> Self {
        self.routes.push(Route {
            needle: needle.into(),
            replies,
            latency: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        });
        self
    }

    /// Route the built-in prompt of `stage` to a fixed reply.
    pub fn reply(self, stage: StageKind, reply: impl Into<String>) -> Self {
        self.route(stage.builtin_marker(), vec![Ok(reply.into())])
    }

    /// Route the built-in prompt of `stage` to a sequence of outcomes.
    pub fn replies(self, stage: StageKind, replies: Vec<Result<String, InvocationError>>) -> Self {
        self.route(stage.builtin_marker(), replies)
    }

    /// Delay every reply of the most recently added route.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        if let Some(route) = self.routes.last_mut() {
            route.latency = Some(latency);
        }
        self
    }

    fn find(&self, needle: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.needle == needle)
    }

    /// Number of calls routed to `stage` so far.
    pub fn calls(&self, stage: StageKind) -> usize {
        self.find(stage.builtin_marker())
            .map_or(0, |route| route.calls.load(Ordering::SeqCst))
    }

    /// Prompts routed to `stage`, in call order.
    pub fn prompts(&self, stage: StageKind) -> Vec<String> {
        self.find(stage.builtin_marker())
            .and_then(|route| route.prompts.lock().ok().map(|p| p.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    async fn generate(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<String, InvocationError> {
        let route = self
            .routes
            .iter()
            .find(|route| prompt.contains(&route.needle))
            .ok_or_else(|| {
                InvocationError::Configuration("no scripted reply matches the prompt".to_string())
            })?;

        let index = route.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = route.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let reply = route
            .replies
            .get(index)
            .or_else(|| route.replies.last())
            .cloned()
            .unwrap_or_else(|| {
                Err(InvocationError::Configuration(format!(
                    "route {} has no replies",
                    route.needle
                )))
            });

        if let Some(latency) = route.latency {
            tokio::time::sleep(latency).await;
        }
        reply
    }
}
