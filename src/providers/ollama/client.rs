use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MendError, Result};
use crate::providers::http::{ensure_success, read_json, send};
use crate::providers::TextGenerator;

const SERVICE: &str = "Ollama";

/// Model pulls download gigabytes, so they get a longer budget than generation.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Client for a local Ollama server.
pub struct OllamaClient {
    client: Client,
    host: Url,
    model: String,
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

impl OllamaClient {
    pub fn new(host: &str, model: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("testmend/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| MendError::Config(format!("Failed to create HTTP client: {e}")))?;

        let normalized = format!("{}/", host.trim_end_matches('/'));
        let host = Url::parse(&normalized)
            .map_err(|e| MendError::Config(format!("Invalid Ollama host '{host}': {e}")))?;

        Ok(Self {
            client,
            host,
            model: model.into(),
            system_prompt: None,
        })
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.host
            .join(path)
            .map_err(|e| MendError::Config(format!("Invalid Ollama endpoint '{path}': {e}")))
    }

    /// Whether the configured model is already present on the server.
    pub async fn model_available(&self) -> Result<bool> {
        let operation = "list local models";
        let response = send(SERVICE, operation, self.client.get(self.endpoint("api/tags")?)).await?;
        let response = ensure_success(SERVICE, operation, response).await?;
        let tags: TagsResponse = read_json(SERVICE, operation, response).await?;
        Ok(tags.models.iter().any(|m| m.name == self.model))
    }

    pub async fn pull_model(&self) -> Result<()> {
        let operation = format!("pull model {}", self.model);
        info!("Pulling Ollama model {}...", self.model);
        let request = self
            .client
            .post(self.endpoint("api/pull")?)
            .timeout(PULL_TIMEOUT)
            .json(&PullRequest {
                name: &self.model,
                stream: false,
            });
        let response = send(SERVICE, &operation, request).await?;
        ensure_success(SERVICE, &operation, response).await?;
        Ok(())
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let operation = format!("generate with {}", self.model);
        debug!("{SERVICE}: prompt of {} chars", prompt.len());

        let request = self
            .client
            .post(self.endpoint("api/generate")?)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                system: self.system_prompt.as_deref(),
            });
        let response = send(SERVICE, &operation, request).await?;
        let response = ensure_success(SERVICE, &operation, response).await?;
        let body: GenerateResponse = read_json(SERVICE, &operation, response).await?;
        Ok(body.response)
    }
}
