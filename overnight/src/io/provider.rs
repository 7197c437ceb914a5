//! Completion provider abstraction.
//!
//! The [`CompletionProvider`] trait decouples the pipeline from the service
//! that produces text (currently an Ollama-compatible HTTP API). Tests use
//! scripted providers that return predetermined completions without touching
//! the network.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ProviderConfig;

/// A text-completion capability with a readiness probe.
///
/// Implementations must give up once `timeout` elapses; the pipeline passes
/// the remaining run budget so a stalled request cannot outlive the run.
pub trait CompletionProvider {
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String>;

    fn health_check(&self) -> Result<()>;
}

/// Sampling options sent with every generate request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Provider backed by an Ollama-compatible HTTP endpoint.
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    options: GenerationOptions,
    health_timeout: Duration,
    client: reqwest::blocking::Client,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: GenerationOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_predict: config.num_predict,
            },
            health_timeout: Duration::from_secs(config.health_timeout_secs),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionProvider for OllamaProvider {
    #[instrument(skip_all, fields(model = %self.model, timeout_secs = timeout.as_secs_f64(), prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options,
        };

        debug!(%url, "sending generate request");
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("send generate request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "generate request rejected");
            bail!("provider returned status {}", status.as_u16());
        }

        let body: GenerateResponse = response.json().context("decode generate response")?;
        if !body.done {
            return Err(anyhow!("generation incomplete"));
        }
        info!(response_bytes = body.response.len(), "generation finished");
        Ok(body.response)
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint, model = %self.model))]
    fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .with_context(|| format!("provider not reachable at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("provider health check failed with status {}", status.as_u16());
        }

        let tags: TagsResponse = response.json().context("decode model list")?;
        if !tags.models.iter().any(|tag| tag.name == self.model) {
            bail!("model {} not found at {}", self.model, self.endpoint);
        }
        debug!(models = tags.models.len(), "provider healthy");
        Ok(())
    }
}
