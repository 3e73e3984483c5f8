//! Summarization backends.
//!
//! A [`SummarizationBackend`] turns one chunk of source text into a short
//! natural-language summary. Two request shapes cover the hosted inference
//! models in the registry:
//!
//! - summarization models take the raw text and return `summary_text`
//! - generation models take a structured prompt and return `generated_text`
//!
//! Retry policy lives in the orchestrator; backends only classify failures
//! as retryable or permanent via [`Error::Backend`].

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::chunk::default_token_estimate;
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::models::Subject;

/// One chunk submitted for summarization, with subject context for
/// prompt-shaped backends.
pub struct SummarizeRequest<'a> {
    pub text: &'a str,
    pub subject: &'a Subject,
    pub unit_path: &'a str,
    /// Length hints forwarded to the model. Hints, not guarantees.
    pub max_length: usize,
    pub min_length: usize,
}

#[async_trait]
pub trait SummarizationBackend: Send + Sync {
    /// Registry name (e.g. `"bart"`).
    fn name(&self) -> &str;

    /// Model identifier (e.g. `"facebook/bart-large-cnn"`).
    fn model(&self) -> &str;

    /// Measure text under this backend's token accounting. The default is a
    /// character-based estimate.
    fn count_tokens(&self, text: &str) -> usize {
        default_token_estimate(text)
    }

    async fn summarize(&self, request: &SummarizeRequest<'_>) -> Result<String>;
}

/// Built-in registry: name, shape, model identifier.
const REGISTRY: &[(&str, BackendKind, &str)] = &[
    ("bart", BackendKind::Summarization, "facebook/bart-large-cnn"),
    ("flan-t5", BackendKind::Generation, "google/flan-t5-base"),
    ("codet5", BackendKind::Generation, "Salesforce/codet5-base"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Summarization,
    Generation,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Summarization => "summarization",
            BackendKind::Generation => "generation",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "summarization" => Ok(BackendKind::Summarization),
            "generation" => Ok(BackendKind::Generation),
            other => Err(Error::Config(format!(
                "unknown backend kind '{}' (expected 'summarization' or 'generation')",
                other
            ))),
        }
    }
}

/// The registered backends, for listing and validation.
pub fn known_backends() -> Vec<(&'static str, &'static str, &'static str)> {
    REGISTRY
        .iter()
        .map(|(name, kind, model)| (*name, kind.as_str(), *model))
        .collect()
}

/// Construct the configured backend.
///
/// `kind` and `model` override the registry entry, allowing any hosted
/// model under a custom name. An unregistered name without overrides is a
/// configuration error.
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn SummarizationBackend>> {
    let registered = REGISTRY.iter().find(|(name, _, _)| *name == config.name);

    let kind = match (&config.kind, registered) {
        (Some(kind), _) => BackendKind::parse(kind)?,
        (None, Some((_, kind, _))) => *kind,
        (None, None) => {
            let names: Vec<&str> = REGISTRY.iter().map(|(n, _, _)| *n).collect();
            return Err(Error::Config(format!(
                "unknown backend '{}' (known: {}; or set backend.kind and backend.model)",
                config.name,
                names.join(", ")
            )));
        }
    };

    let model = match (&config.model, registered) {
        (Some(model), _) => model.clone(),
        (None, Some((_, _, model))) => (*model).to_string(),
        (None, None) => {
            return Err(Error::Config(format!(
                "backend '{}' sets backend.kind but not backend.model",
                config.name
            )))
        }
    };

    let client = HfClient::new(config)?;
    match kind {
        BackendKind::Summarization => Ok(Box::new(SummarizationModel {
            name: config.name.clone(),
            model,
            client,
        })),
        BackendKind::Generation => Ok(Box::new(GenerationModel {
            name: config.name.clone(),
            model,
            client,
        })),
    }
}

/// Shared HTTP client for the hosted inference API.
struct HfClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HfClient {
    fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("codebrief/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            log::info!("{} not set; calling inference API anonymously", config.token_env);
        }

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post(&self, model: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, model);
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            // Timeouts and connection failures are worth retrying.
            if e.is_timeout() || e.is_connect() {
                Error::backend_transient(format!("request to {} failed: {}", model, e))
            } else {
                Error::backend_permanent(format!("request to {} failed: {}", model, e))
            }
        })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = format!("{} returned {}: {}", model, status.as_u16(), text);
            // 429 and 5xx (including model-loading 503) are transient.
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(Error::backend_transient(message))
            } else {
                Err(Error::backend_permanent(message))
            };
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            Error::backend_permanent(format!("{} returned non-JSON body: {}", model, e))
        })?;

        // The API sometimes reports errors in a 200 body while a model warms
        // up.
        if let Some(err) = value.get("error").and_then(Value::as_str) {
            return Err(Error::backend_transient(format!("{}: {}", model, err)));
        }
        Ok(value)
    }
}

/// Backend for models served under the summarization task.
struct SummarizationModel {
    name: String,
    model: String,
    client: HfClient,
}

#[async_trait]
impl SummarizationBackend for SummarizationModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, request: &SummarizeRequest<'_>) -> Result<String> {
        let body = json!({
            "inputs": request.text,
            "parameters": {
                "max_length": request.max_length,
                "min_length": request.min_length,
            },
        });
        let value = self.client.post(&self.model, body).await?;
        extract_field(&value, "summary_text", &self.model)
    }
}

/// Backend for models served under the text generation task; the chunk is
/// wrapped in an instruction prompt.
struct GenerationModel {
    name: String,
    model: String,
    client: HfClient,
}

#[async_trait]
impl SummarizationBackend for GenerationModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, request: &SummarizeRequest<'_>) -> Result<String> {
        let prompt = build_prompt(request);
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": request.max_length,
                "min_new_tokens": request.min_length,
            },
        });
        let value = self.client.post(&self.model, body).await?;
        let generated = extract_field(&value, "generated_text", &self.model)?;
        Ok(strip_prompt_echo(&generated, &prompt))
    }
}

/// Build the instruction prompt for generation-shaped models.
fn build_prompt(request: &SummarizeRequest<'_>) -> String {
    match request.subject {
        Subject::Function { name, params } => format!(
            "Summarize the following Python function:\n\n\
             Function Name: {}\nArguments: {}\nCode:\n{}\n\nSummary:",
            name,
            params.join(", "),
            request.text
        ),
        Subject::File => format!(
            "Summarize the following Python source file:\n\n\
             File: {}\nCode:\n{}\n\nSummary:",
            request.unit_path, request.text
        ),
    }
}

/// Some generation models echo the prompt before the completion; keep only
/// the completion.
fn strip_prompt_echo(generated: &str, prompt: &str) -> String {
    generated
        .strip_prefix(prompt)
        .unwrap_or(generated)
        .trim()
        .to_string()
}

/// Pull `field` out of the `[{field: ...}]` response shape.
fn extract_field(value: &Value, field: &str, model: &str) -> Result<String> {
    value
        .get(0)
        .and_then(|entry| entry.get(field))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            Error::backend_permanent(format!(
                "{} response missing {}: {}",
                model, field, value
            ))
        })
}
